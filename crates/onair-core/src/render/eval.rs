use super::context::RenderContext;
use super::parser::{Expr, Function, Segment};
use super::value::{format_duration, round_duration, Value};
use crate::error::RenderError;

fn type_error(function: Function, got: &Value) -> RenderError {
    RenderError::Type(format!(
        "{}() does not accept {}",
        function.name(),
        got.type_name()
    ))
}

pub fn eval(expr: &Expr, ctx: &RenderContext<'_>) -> Result<Value, RenderError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => ctx.lookup(*name),
        Expr::FString(segments) => {
            let mut out = String::new();
            for segment in segments {
                match segment {
                    Segment::Text(text) => out.push_str(text),
                    Segment::Expr(expr) => out.push_str(&eval(expr, ctx)?.to_string()),
                }
            }
            Ok(Value::Str(out))
        }
        Expr::Call(function, args) => call(*function, args, ctx),
        Expr::Add(lhs, rhs) => eval(lhs, ctx)?.add(eval(rhs, ctx)?),
        Expr::Compare { negated, lhs, rhs } => {
            let equal = eval(lhs, ctx)?.loosely_equals(&eval(rhs, ctx)?);
            Ok(Value::Bool(equal != *negated))
        }
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, ctx)?.is_truthy())),
        // `and`/`or` yield an operand, not a bool, and short-circuit.
        Expr::And(lhs, rhs) => {
            let left = eval(lhs, ctx)?;
            if left.is_truthy() {
                eval(rhs, ctx)
            } else {
                Ok(left)
            }
        }
        Expr::Or(lhs, rhs) => {
            let left = eval(lhs, ctx)?;
            if left.is_truthy() {
                Ok(left)
            } else {
                eval(rhs, ctx)
            }
        }
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => {
            if eval(condition, ctx)?.is_truthy() {
                eval(then, ctx)
            } else {
                eval(otherwise, ctx)
            }
        }
    }
}

fn call(function: Function, args: &[Expr], ctx: &RenderContext<'_>) -> Result<Value, RenderError> {
    // Arity was checked at parse time.
    match function {
        Function::PosAvail => Ok(Value::Bool(ctx.position_available())),
        Function::PredictedPos => ctx.predicted_position(),
        Function::Default => match eval(&args[0], ctx) {
            Ok(Value::None) | Err(RenderError::Missing(_)) => eval(&args[1], ctx),
            other => other,
        },
        Function::Join => {
            let items = match eval(&args[0], ctx)? {
                Value::List(items) => items,
                other => return Err(type_error(function, &other)),
            };
            let separator = match eval(&args[1], ctx)? {
                Value::Str(s) => s,
                other => return Err(type_error(function, &other)),
            };
            let joined = items
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(&separator);
            Ok(Value::Str(joined))
        }
        _ => {
            let arg = eval(&args[0], ctx)?;
            match (function, arg) {
                (Function::RoundTd, Value::Duration(d)) => Ok(Value::Duration(round_duration(d))),
                (Function::FmtTd, Value::Duration(d)) => Ok(Value::Str(format_duration(d))),
                (Function::Str, value) => Ok(Value::Str(value.to_string())),
                (Function::Upper, Value::Str(s)) => Ok(Value::Str(s.to_uppercase())),
                (Function::Lower, Value::Str(s)) => Ok(Value::Str(s.to_lowercase())),
                (Function::Len, Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
                (Function::Len, Value::List(items)) => Ok(Value::Int(items.len() as i64)),
                (function, other) => Err(type_error(function, &other)),
            }
        }
    }
}
