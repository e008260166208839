use numerr_expr::{Array, Assignment, BinOp, Expr, INT32, INT64, eval_binary, read_value};
use proptest::prelude::*;

proptest! {
    #[test]
    fn shl_by_at_least_the_width_is_zero(value in any::<u32>(), amount in 32u64..=u32::MAX as u64) {
        prop_assert_eq!(eval_binary(BinOp::Shl, value as u64, amount, INT32), 0);
    }

    #[test]
    fn shl_below_the_width_matches_wrapping_shift(value in any::<u32>(), amount in 0u32..32) {
        prop_assert_eq!(
            eval_binary(BinOp::Shl, value as u64, amount as u64, INT32),
            value.wrapping_shl(amount) as u64
        );
    }

    #[test]
    fn symbolic_shift_goal_holds_for_every_large_amount(amount in 32u32..=u32::MAX) {
        let shift = Array::new("shift", 4);
        let s = read_value(&shift, 0, INT32);
        let goal = Expr::eq(Expr::shl(Expr::constant(2, INT32), s), Expr::zero(INT32));
        let a = Assignment::new(&[shift], &[amount.to_le_bytes().to_vec()]);
        prop_assert!(a.evaluate(&goal).is_true());
    }

    #[test]
    fn wide_add_wraps_at_sixty_four_bits(a in any::<u64>(), b in any::<u64>()) {
        let e = Expr::add(Expr::constant(a, INT64), Expr::constant(b, INT64));
        prop_assert_eq!(e.as_constant(), Some(a.wrapping_add(b)));
    }
}
