//! Numeric builtins.

use super::{check_arity, eval_args, Function, StaticFunction, StdLib};
use crate::env::Bindings;
use crate::error::{SourcePosition, WdlError};
use crate::expr::typecheck::TypeContext;
use crate::expr::Expression;
use crate::types::Type;
use crate::value::Value;

pub fn register(lib: &mut StdLib) {
    lib.register(StaticFunction::new(
        "floor",
        vec![Type::float(false)],
        Type::int(false),
        |_, args| Ok(Value::int(args[0].as_float().unwrap().floor() as i64)),
    ));
    lib.register(StaticFunction::new(
        "ceil",
        vec![Type::float(false)],
        Type::int(false),
        |_, args| Ok(Value::int(args[0].as_float().unwrap().ceil() as i64)),
    ));
    lib.register(StaticFunction::new(
        "round",
        vec![Type::float(false)],
        Type::int(false),
        |_, args| Ok(Value::int(args[0].as_float().unwrap().round() as i64)),
    ));
    lib.register(Box::new(MinMax { minimum: true }));
    lib.register(Box::new(MinMax { minimum: false }));
}

/// `min`/`max`: two numeric arguments; Int when both are Int, else Float.
struct MinMax {
    minimum: bool,
}

impl Function for MinMax {
    fn name(&self) -> &str {
        if self.minimum {
            "min"
        } else {
            "max"
        }
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, self.name(), args, 2, 2)?;
        let mut all_int = true;
        for arg in args.iter_mut() {
            let t = arg.infer_type(ctx)?;
            match t {
                Type::Int { .. } => {}
                Type::Float { .. } => all_int = false,
                other => {
                    return Err(WdlError::static_mismatch(
                        arg.pos().clone(),
                        "Int or Float".to_string(),
                        other.to_string(),
                        "",
                    ))
                }
            }
        }
        Ok(if all_int {
            Type::int(false)
        } else {
            Type::float(false)
        })
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let values = eval_args(args, env, stdlib)?;
        match (&values[0], &values[1]) {
            (Value::Int { value: a }, Value::Int { value: b }) => Ok(Value::int(if self.minimum {
                *a.min(b)
            } else {
                *a.max(b)
            })),
            _ => {
                let a = values[0]
                    .as_float()
                    .ok_or_else(|| WdlError::eval(pos.clone(), "non-numeric argument"))?;
                let b = values[1]
                    .as_float()
                    .ok_or_else(|| WdlError::eval(pos.clone(), "non-numeric argument"))?;
                Ok(Value::float(if self.minimum { a.min(b) } else { a.max(b) }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> SourcePosition {
        SourcePosition::new("t.wdl".into(), "t.wdl".into(), 1, 1, 1, 2)
    }

    fn eval1(name: &str, args: Vec<Expression>) -> Result<Value, WdlError> {
        let lib = StdLib::base("1.0");
        let env = Bindings::new();
        lib.get_function(name).unwrap().eval(&pos(), &args, &env, &lib)
    }

    #[test]
    fn rounding() {
        assert_eq!(
            eval1("floor", vec![Expression::float(pos(), 2.9)]).unwrap().as_int(),
            Some(2)
        );
        assert_eq!(
            eval1("ceil", vec![Expression::float(pos(), 2.1)]).unwrap().as_int(),
            Some(3)
        );
        assert_eq!(
            eval1("round", vec![Expression::float(pos(), 2.5)]).unwrap().as_int(),
            Some(3)
        );
        // Int arguments coerce to Float
        assert_eq!(
            eval1("floor", vec![Expression::int(pos(), 4)]).unwrap().as_int(),
            Some(4)
        );
    }

    #[test]
    fn min_max_preserve_int() {
        let v = eval1(
            "min",
            vec![Expression::int(pos(), 3), Expression::int(pos(), 5)],
        )
        .unwrap();
        assert_eq!(v.as_int(), Some(3));

        let f = eval1(
            "max",
            vec![Expression::int(pos(), 3), Expression::float(pos(), 5.5)],
        )
        .unwrap();
        assert_eq!(f.as_float(), Some(5.5));
    }
}
