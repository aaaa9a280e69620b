//! Stack IR tests
