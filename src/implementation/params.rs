// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! This module implements the conversion rules of the parameter store: a
//! pure, exhaustive table from (value, target kind) to a converted value or
//! a typed failure. Conversions never truncate silently: a narrowing
//! conversion only succeeds when the source value survives the round trip
//! exactly.

use crate::{ParamKind, ParamValue};

/// The two ways a conversion can fail. This is the kind-level verdict; the
/// model handle attaches the parameter name and the offending value to turn
/// it into a full `ParamError`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CoercionFailure {
    /// The source kind is not convertible to the target kind at all
    Mismatch,
    /// The kinds are compatible but this specific value does not fit
    Narrowing,
}

/// Converts `value` into the `target` kind following the fixed
/// promotion/narrowing rules:
///
///   - target **Bool**: booleans pass through; numeric values convert via a
///     nonzero test; text only when it is exactly one of the boolean tokens
///     (`"0"`, `"1"`, `"true"`, `"false"`, `"TRUE"`, `"FALSE"`).
///   - target **Int**/**LongInt**: integer values narrow or widen with an
///     exact round-trip check; real values are accepted only when their
///     fractional part is exactly zero and the integral value fits.
///   - target **Real**: any integer value whose magnitude is exactly
///     representable, and reals themselves.
///   - target **Char**: characters, and text of length exactly one.
///   - target **Text**: text, and characters (promoted to a one-char string).
///
/// Anything else is a `Mismatch`.
pub fn coerce(value: &ParamValue, target: ParamKind) -> Result<ParamValue, CoercionFailure> {
    use ParamKind as K;
    use ParamValue as V;
    match (value, target) {
        // --- to bool --------------------------------------------------------
        (V::Bool(b),    K::Bool) => Ok(V::Bool(*b)),
        (V::Int(x),     K::Bool) => Ok(V::Bool(*x != 0)),
        (V::LongInt(x), K::Bool) => Ok(V::Bool(*x != 0)),
        (V::Real(x),    K::Bool) => Ok(V::Bool(*x != 0.0)),
        (V::Text(s),    K::Bool) => match s.as_str() {
            "1" | "true"  | "TRUE"  => Ok(V::Bool(true)),
            "0" | "false" | "FALSE" => Ok(V::Bool(false)),
            _ => Err(CoercionFailure::Mismatch),
        },
        (V::Char(_),    K::Bool) => Err(CoercionFailure::Mismatch),

        // --- to int ---------------------------------------------------------
        (V::Int(x),     K::Int) => Ok(V::Int(*x)),
        (V::LongInt(x), K::Int) => i32::try_from(*x)
            .map(V::Int)
            .map_err(|_| CoercionFailure::Narrowing),
        (V::Real(x),    K::Int) => {
            let whole = real_to_long(*x)?;
            i32::try_from(whole)
                .map(V::Int)
                .map_err(|_| CoercionFailure::Narrowing)
        }
        (_,             K::Int) => Err(CoercionFailure::Mismatch),

        // --- to long int ----------------------------------------------------
        (V::Int(x),     K::LongInt) => Ok(V::LongInt(*x as i64)),
        (V::LongInt(x), K::LongInt) => Ok(V::LongInt(*x)),
        (V::Real(x),    K::LongInt) => real_to_long(*x).map(V::LongInt),
        (_,             K::LongInt) => Err(CoercionFailure::Mismatch),

        // --- to real --------------------------------------------------------
        (V::Int(x),     K::Real) => Ok(V::Real(*x as f64)),
        (V::LongInt(x), K::Real) => {
            // not every i64 survives the trip through the 52 bit mantissa
            if (*x as f64) as i64 == *x {
                Ok(V::Real(*x as f64))
            } else {
                Err(CoercionFailure::Narrowing)
            }
        }
        (V::Real(x),    K::Real) => Ok(V::Real(*x)),
        (_,             K::Real) => Err(CoercionFailure::Mismatch),

        // --- to char --------------------------------------------------------
        (V::Char(c),    K::Char) => Ok(V::Char(*c)),
        (V::Text(s),    K::Char) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(V::Char(c)),
                _ => Err(CoercionFailure::Mismatch),
            }
        }
        (_,             K::Char) => Err(CoercionFailure::Mismatch),

        // --- to text --------------------------------------------------------
        (V::Text(s),    K::Text) => Ok(V::Text(s.clone())),
        (V::Char(c),    K::Text) => Ok(V::Text(c.to_string())),
        (_,             K::Text) => Err(CoercionFailure::Mismatch),
    }
}

/// A real converts to an integer only when its fractional part is exactly
/// zero and the whole value is representable as an i64.
fn real_to_long(x: f64) -> Result<i64, CoercionFailure> {
    if !x.is_finite() || x.fract() != 0.0 {
        return Err(CoercionFailure::Narrowing);
    }
    // i64::MAX as f64 rounds up to 2^63 which is *not* a valid i64, hence
    // the strict upper comparison
    if x >= i64::MIN as f64 && x < i64::MAX as f64 {
        Ok(x as i64)
    } else {
        Err(CoercionFailure::Narrowing)
    }
}

/// The native types that can travel in and out of the parameter store. This
/// is what backs the generic typed accessors of the model handle: `T::KIND`
/// names the kind a caller asks for, and `from_exact` recovers the native
/// value once the conversion table has produced a value of that exact kind.
pub trait ParamCast: Sized + Into<ParamValue> {
    const KIND: ParamKind;
    fn from_exact(value: &ParamValue) -> Option<Self>;
}
impl ParamCast for bool {
    const KIND: ParamKind = ParamKind::Bool;
    fn from_exact(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Bool(x) => Some(*x),
            _ => None,
        }
    }
}
impl ParamCast for i32 {
    const KIND: ParamKind = ParamKind::Int;
    fn from_exact(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Int(x) => Some(*x),
            _ => None,
        }
    }
}
impl ParamCast for i64 {
    const KIND: ParamKind = ParamKind::LongInt;
    fn from_exact(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::LongInt(x) => Some(*x),
            _ => None,
        }
    }
}
impl ParamCast for f64 {
    const KIND: ParamKind = ParamKind::Real;
    fn from_exact(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Real(x) => Some(*x),
            _ => None,
        }
    }
}
impl ParamCast for char {
    const KIND: ParamKind = ParamKind::Char;
    fn from_exact(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Char(x) => Some(*x),
            _ => None,
        }
    }
}
impl ParamCast for String {
    const KIND: ParamKind = ParamKind::Text;
    fn from_exact(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Text(x) => Some(x.clone()),
            _ => None,
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

/// The conversion table is tested cell by cell: for every (source kind,
/// target kind) pair there is at least one test asserting the documented
/// outcome, rather than relying on fallthrough defaults.
#[cfg(test)]
mod test_coercion {
    use crate::implementation::params::{coerce, CoercionFailure};
    use crate::{ParamKind as K, ParamValue as V};

    // --- target bool --------------------------------------------------------
    #[test]
    fn bool_to_bool_is_identity() {
        assert_eq!(Ok(V::Bool(true)), coerce(&V::Bool(true), K::Bool));
        assert_eq!(Ok(V::Bool(false)), coerce(&V::Bool(false), K::Bool));
    }
    #[test]
    fn numerics_to_bool_use_a_nonzero_test() {
        assert_eq!(Ok(V::Bool(false)), coerce(&V::Int(0), K::Bool));
        assert_eq!(Ok(V::Bool(true)),  coerce(&V::Int(2), K::Bool));
        assert_eq!(Ok(V::Bool(false)), coerce(&V::LongInt(0), K::Bool));
        assert_eq!(Ok(V::Bool(true)),  coerce(&V::LongInt(-1), K::Bool));
        assert_eq!(Ok(V::Bool(false)), coerce(&V::Real(0.0), K::Bool));
        assert_eq!(Ok(V::Bool(true)),  coerce(&V::Real(2.5), K::Bool));
    }
    #[test]
    fn only_boolean_tokens_convert_from_text_to_bool() {
        assert_eq!(Ok(V::Bool(true)),  coerce(&V::Text("1".to_string()), K::Bool));
        assert_eq!(Ok(V::Bool(false)), coerce(&V::Text("0".to_string()), K::Bool));
        assert_eq!(Ok(V::Bool(true)),  coerce(&V::Text("true".to_string()), K::Bool));
        assert_eq!(Ok(V::Bool(false)), coerce(&V::Text("false".to_string()), K::Bool));
        assert_eq!(Ok(V::Bool(true)),  coerce(&V::Text("TRUE".to_string()), K::Bool));
        assert_eq!(Ok(V::Bool(false)), coerce(&V::Text("FALSE".to_string()), K::Bool));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Text("yes".to_string()), K::Bool));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Text("2".to_string()), K::Bool));
    }
    #[test]
    fn char_does_not_convert_to_bool() {
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Char('1'), K::Bool));
    }

    // --- target int ---------------------------------------------------------
    #[test]
    fn int_to_int_is_identity() {
        assert_eq!(Ok(V::Int(-7)), coerce(&V::Int(-7), K::Int));
    }
    #[test]
    fn long_to_int_narrows_with_round_trip_check() {
        assert_eq!(Ok(V::Int(42)), coerce(&V::LongInt(42), K::Int));
        assert_eq!(
            Err(CoercionFailure::Narrowing),
            coerce(&V::LongInt(i64::from(i32::MAX) + 1), K::Int)
        );
    }
    #[test]
    fn real_to_int_requires_a_zero_fractional_part() {
        assert_eq!(Ok(V::Int(2)), coerce(&V::Real(2.0), K::Int));
        assert_eq!(Err(CoercionFailure::Narrowing), coerce(&V::Real(2.5), K::Int));
        assert_eq!(Err(CoercionFailure::Narrowing), coerce(&V::Real(1e300), K::Int));
        assert_eq!(Err(CoercionFailure::Narrowing), coerce(&V::Real(f64::NAN), K::Int));
    }
    #[test]
    fn non_numerics_do_not_convert_to_int() {
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Bool(true), K::Int));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Char('4'), K::Int));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Text("4".to_string()), K::Int));
    }

    // --- target long int ----------------------------------------------------
    #[test]
    fn int_widens_to_long() {
        assert_eq!(Ok(V::LongInt(-7)), coerce(&V::Int(-7), K::LongInt));
    }
    #[test]
    fn long_to_long_is_identity() {
        assert_eq!(Ok(V::LongInt(i64::MAX)), coerce(&V::LongInt(i64::MAX), K::LongInt));
    }
    #[test]
    fn real_to_long_requires_a_zero_fractional_part() {
        assert_eq!(Ok(V::LongInt(2)), coerce(&V::Real(2.0), K::LongInt));
        assert_eq!(Err(CoercionFailure::Narrowing), coerce(&V::Real(2.5), K::LongInt));
        assert_eq!(Err(CoercionFailure::Narrowing), coerce(&V::Real(f64::INFINITY), K::LongInt));
        // 2^63 is exactly representable as f64 but one too large for an i64
        assert_eq!(
            Err(CoercionFailure::Narrowing),
            coerce(&V::Real(9_223_372_036_854_775_808.0), K::LongInt)
        );
    }
    #[test]
    fn non_numerics_do_not_convert_to_long() {
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Bool(true), K::LongInt));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Char('4'), K::LongInt));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Text("4".to_string()), K::LongInt));
    }

    // --- target real --------------------------------------------------------
    #[test]
    fn int_always_converts_to_real() {
        assert_eq!(Ok(V::Real(-7.0)), coerce(&V::Int(-7), K::Real));
        assert_eq!(Ok(V::Real(i32::MAX as f64)), coerce(&V::Int(i32::MAX), K::Real));
    }
    #[test]
    fn long_to_real_requires_an_exact_mantissa_fit() {
        assert_eq!(Ok(V::Real(1024.0)), coerce(&V::LongInt(1024), K::Real));
        // (2^53 + 1) cannot be represented exactly in a f64
        assert_eq!(
            Err(CoercionFailure::Narrowing),
            coerce(&V::LongInt((1_i64 << 53) + 1), K::Real)
        );
    }
    #[test]
    fn real_to_real_is_identity() {
        assert_eq!(Ok(V::Real(2.5)), coerce(&V::Real(2.5), K::Real));
    }
    #[test]
    fn non_numerics_do_not_convert_to_real() {
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Bool(true), K::Real));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Char('4'), K::Real));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Text("4.0".to_string()), K::Real));
    }

    // --- target char --------------------------------------------------------
    #[test]
    fn char_to_char_is_identity() {
        assert_eq!(Ok(V::Char('s')), coerce(&V::Char('s'), K::Char));
    }
    #[test]
    fn only_one_char_text_converts_to_char() {
        assert_eq!(Ok(V::Char('s')), coerce(&V::Text("s".to_string()), K::Char));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Text("st".to_string()), K::Char));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Text(String::new()), K::Char));
    }
    #[test]
    fn numerics_do_not_convert_to_char() {
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Bool(true), K::Char));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Int(115), K::Char));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::LongInt(115), K::Char));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Real(115.0), K::Char));
    }

    // --- target text --------------------------------------------------------
    #[test]
    fn text_to_text_is_identity() {
        assert_eq!(
            Ok(V::Text("hello".to_string())),
            coerce(&V::Text("hello".to_string()), K::Text)
        );
    }
    #[test]
    fn char_promotes_to_one_char_text() {
        assert_eq!(Ok(V::Text("s".to_string())), coerce(&V::Char('s'), K::Text));
    }
    #[test]
    fn numerics_do_not_convert_to_text() {
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Bool(true), K::Text));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Int(4), K::Text));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::LongInt(4), K::Text));
        assert_eq!(Err(CoercionFailure::Mismatch), coerce(&V::Real(4.0), K::Text));
    }
}
