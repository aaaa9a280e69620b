//! Every comparison against equal, smaller and larger operands, on both
//! targets. Comparisons produce exactly 0 or 1.

use crate::support::jvm_sim;
use crate::support::x86_sim;
use crate::support::{binop, push, write};
use stackc::backends::{JvmBackend, X86Backend};
use stackc::middle::interp::eval_binary;
use stackc::middle::{BinaryKind, StackProgram, StackStatement};

const OPERANDS: [(i32, i32); 6] = [
    (3, 3),
    (2, 3),
    (4, 3),
    (-5, 3),
    (i32::MIN, i32::MAX),
    (i32::MAX, i32::MIN),
];

fn grid() -> (Vec<StackStatement>, Vec<i32>) {
    let mut body = Vec::new();
    let mut expected = Vec::new();
    for kind in BinaryKind::COMPARISONS {
        for (left, right) in OPERANDS {
            body.push(push(left));
            body.push(push(right));
            body.push(binop(kind));
            body.push(write());
            expected.push(eval_binary(kind, left, right).unwrap());
        }
    }
    (body, expected)
}

#[test]
fn test_reference_table() {
    let (_, expected) = grid();
    // Eq, Neq, Gt, Lt, Leq, Geq over the first three pairs
    let firsts: Vec<_> = expected.chunks(OPERANDS.len()).map(|c| [c[0], c[1], c[2]]).collect();
    assert_eq!(
        firsts,
        vec![[1, 0, 0], [0, 1, 1], [0, 0, 1], [0, 1, 0], [1, 1, 0], [1, 0, 1]]
    );
}

#[test]
fn test_jvm_comparisons() {
    let (body, expected) = grid();
    let bytes = JvmBackend::new().compile(&body).unwrap();
    assert_eq!(jvm_sim::run_class(&bytes, &[]).unwrap(), expected);
}

#[test]
fn test_x86_comparisons() {
    let (body, expected) = grid();
    let asm = X86Backend::default()
        .compile(&StackProgram::from_main(body))
        .unwrap();
    assert_eq!(x86_sim::run_asm(&asm, "main", &[]).unwrap().output, expected);
}

#[test]
fn test_comparison_feeds_jz() {
    // (a < b) ? a : b, for a handful of pairs
    for (a, b) in OPERANDS {
        let body = vec![
            push(a),
            push(b),
            binop(BinaryKind::Lt),
            StackStatement::Jz(6),
            push(a),
            StackStatement::Jmp(7),
            push(b),
            write(),
        ];
        let min = a.min(b);

        let bytes = JvmBackend::new().compile(&body).unwrap();
        assert_eq!(jvm_sim::run_class(&bytes, &[]).unwrap(), vec![min]);

        let asm = X86Backend::default()
            .compile(&StackProgram::from_main(body))
            .unwrap();
        assert_eq!(x86_sim::run_asm(&asm, "main", &[]).unwrap().output, vec![min]);
    }
}
