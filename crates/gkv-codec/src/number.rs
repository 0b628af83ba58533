//! Decimal rendering of numbers.
//!
//! Stored number text must be stable across implementations, so numbers are
//! rendered with the ECMAScript `Number::toString` algorithm: the shortest
//! digit string that round-trips, positional notation for decimal exponents
//! in `[-7, 21)`, exponent notation (`1e+21`, `1.5e-10`) outside it.

/// Render `n` the way ECMAScript's `Number.prototype.toString()` does.
pub fn to_js_string(n: f64) -> String {
    ryu_js::Buffer::new().format(n).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers() {
        assert_eq!(to_js_string(0.0), "0");
        assert_eq!(to_js_string(-0.0), "0");
        assert_eq!(to_js_string(7.0), "7");
        assert_eq!(to_js_string(-42.0), "-42");
        assert_eq!(to_js_string(1234567.0), "1234567");
        assert_eq!(to_js_string(1e20), "100000000000000000000");
    }

    #[test]
    fn fractions() {
        assert_eq!(to_js_string(0.1), "0.1");
        assert_eq!(to_js_string(123.456), "123.456");
        assert_eq!(to_js_string(0.000001), "0.000001");
        assert_eq!(to_js_string(-2.5), "-2.5");
    }

    #[test]
    fn exponent_forms() {
        assert_eq!(to_js_string(1e21), "1e+21");
        assert_eq!(to_js_string(1.5e21), "1.5e+21");
        assert_eq!(to_js_string(1e-7), "1e-7");
        assert_eq!(to_js_string(1.5e-10), "1.5e-10");
        assert_eq!(to_js_string(-1e-7), "-1e-7");
    }

    #[test]
    fn specials() {
        assert_eq!(to_js_string(f64::NAN), "NaN");
        assert_eq!(to_js_string(f64::INFINITY), "Infinity");
        assert_eq!(to_js_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn rendering_parses_back() {
        for n in [0.1, 1e21, 1.5e-10, 123.456, -9_007_199_254_740_991.0] {
            assert_eq!(to_js_string(n).parse::<f64>().unwrap(), n);
        }
    }
}
