// src/utils/precision.rs
use rust_decimal::Decimal;

/// Floors `amount` to a multiple of `step_size`. A zero step leaves the
/// amount untouched.
///
/// `10.999` with step `1.0` becomes `10.0`.
pub fn normalize_quantity(amount: Decimal, step_size: Decimal) -> Decimal {
    if step_size <= Decimal::ZERO {
        return amount;
    }
    (amount / step_size).floor() * step_size
}

/// Rounds `price` to the nearest multiple of `tick_size`.
///
/// `100.16` with tick `0.1` becomes `100.2`.
pub fn normalize_price(price: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size <= Decimal::ZERO {
        return price;
    }
    (price / tick_size).round() * tick_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quantity_is_floored_to_step() {
        assert_eq!(normalize_quantity(dec!(10.999), dec!(1)), dec!(10));
        assert_eq!(normalize_quantity(dec!(0.123456), dec!(0.001)), dec!(0.123));
        assert_eq!(normalize_quantity(dec!(0.5), dec!(0)), dec!(0.5));
    }

    #[test]
    fn price_is_rounded_to_tick() {
        assert_eq!(normalize_price(dec!(100.16), dec!(0.1)), dec!(100.2));
        assert_eq!(normalize_price(dec!(20000.004), dec!(0.01)), dec!(20000.00));
        assert_eq!(normalize_price(dec!(7), dec!(0)), dec!(7));
    }
}
