use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::error::RenderError;

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

/// A runtime value inside a display expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Duration(Duration),
    Time(DateTime<Utc>),
    List(Vec<Value>),
}

impl Value {
    pub fn opt_str(value: &Option<String>) -> Self {
        match value {
            Some(s) => Value::Str(s.clone()),
            None => Value::None,
        }
    }

    pub fn opt_int(value: Option<u32>) -> Self {
        match value {
            Some(n) => Value::Int(i64::from(n)),
            None => Value::None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Duration(_) => "duration",
            Value::Time(_) => "time",
            Value::List(_) => "list",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Duration(d) => *d != Duration::zero(),
            Value::Time(_) => true,
            Value::List(items) => !items.is_empty(),
        }
    }

    /// `+`: concatenation for strings and lists, arithmetic for numbers and durations.
    pub fn add(self, rhs: Value) -> Result<Value, RenderError> {
        let overflow = || RenderError::Type("arithmetic overflow".into());
        let value = match (self, rhs) {
            (Value::Str(mut a), Value::Str(b)) => {
                a.push_str(&b);
                Value::Str(a)
            }
            (Value::Int(a), Value::Int(b)) => Value::Int(a.checked_add(b).ok_or_else(overflow)?),
            (Value::Int(a), Value::Float(b)) => Value::Float(a as f64 + b),
            (Value::Float(a), Value::Int(b)) => Value::Float(a + b as f64),
            (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
            (Value::Duration(a), Value::Duration(b)) => {
                Value::Duration(a.checked_add(&b).ok_or_else(overflow)?)
            }
            (Value::Time(t), Value::Duration(d)) | (Value::Duration(d), Value::Time(t)) => {
                Value::Time(t.checked_add_signed(d).ok_or_else(overflow)?)
            }
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Value::List(a)
            }
            (a, b) => {
                return Err(RenderError::Type(format!(
                    "unsupported operand types for +: {} and {}",
                    a.type_name(),
                    b.type_name()
                )))
            }
        };
        Ok(value)
    }

    /// `==`: numbers compare by value across int and float.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (a, b) => a == b,
        }
    }

    fn write_repr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            other => write!(f, "{other}"),
        }
    }
}

/// Renders like Python's `str()` so expressions written for the scripts keep their output.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Duration(d) => f.write_str(&timedelta_str(*d)),
            Value::Time(t) => {
                if t.timestamp_subsec_micros() == 0 {
                    write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S+00:00"))
                } else {
                    write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S%.6f+00:00"))
                }
            }
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.write_repr(f)?;
                }
                f.write_str("]")
            }
        }
    }
}

fn total_micros(d: Duration) -> i64 {
    d.num_microseconds()
        .unwrap_or_else(|| d.num_milliseconds().saturating_mul(1000))
}

/// `[-]D day[s], H:MM:SS[.ffffff]`, with days only when non-zero.
///
/// Negative durations borrow from the day count, so `-1s` is `-1 day, 23:59:59`.
pub fn timedelta_str(d: Duration) -> String {
    let micros = total_micros(d);
    let days = micros.div_euclid(MICROS_PER_DAY);
    let rest = micros.rem_euclid(MICROS_PER_DAY);
    let secs = rest / MICROS_PER_SECOND;
    let frac = rest % MICROS_PER_SECOND;

    let mut out = String::new();
    if days != 0 {
        let unit = if days.abs() == 1 { "day" } else { "days" };
        out.push_str(&format!("{days} {unit}, "));
    }
    out.push_str(&format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60));
    if frac != 0 {
        out.push_str(&format!(".{frac:06}"));
    }
    out
}

/// Nearest whole second, ties to even.
pub fn round_duration(d: Duration) -> Duration {
    let seconds = total_micros(d) as f64 / MICROS_PER_SECOND as f64;
    Duration::seconds(seconds.round_ties_even() as i64)
}

/// Drops a leading zero hour (and then a leading zero minute digit): `0:03:25` becomes `3:25`.
pub fn format_duration(d: Duration) -> String {
    let full = timedelta_str(d);
    let trimmed = full.strip_prefix("0:").unwrap_or(&full);
    trimmed.strip_prefix('0').unwrap_or(trimmed).to_string()
}
