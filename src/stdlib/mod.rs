//! The WDL standard library.
//!
//! Every builtin is an implementation of [`Function`], registered by name in
//! a [`StdLib`]. Most have fixed signatures and are expressed as
//! [`StaticFunction`]s; the rest (e.g. `select_first`, `size`, `read_json`)
//! implement custom type rules.
//!
//! One registry serves both evaluation flavors. What differs between task
//! input/command evaluation and task output evaluation is the [`FileAccess`]
//! policy: input evaluation may only read files present in the task's input
//! path map, while output evaluation additionally resolves `stdout()`/
//! `stderr()` and `glob()` against the finished run directory. Outside any
//! task (workflow-level declarations), plain host paths are readable and the
//! task-only functions fail at evaluation time.

pub mod arrays;
pub mod io;
pub mod map;
pub mod math;
pub mod strings;

use crate::env::Bindings;
use crate::error::{SourcePosition, WdlError};
use crate::expr::typecheck::TypeContext;
use crate::expr::Expression;
use crate::types::Type;
use crate::value::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A named standard library function.
pub trait Function: Send + Sync {
    fn name(&self) -> &str;

    /// Validate argument expressions and produce the return type.
    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError>;

    /// Evaluate the application.
    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError>;
}

/// File system mediation for the I/O functions; the difference between the
/// input- and output-evaluation flavors of the library.
pub trait FileAccess: Send + Sync {
    /// Resolve a `File` value to a host path this context may read.
    fn readable_path(&self, pos: &SourcePosition, path: &str) -> Result<PathBuf, WdlError>;

    /// Register a file produced by a `write_*` function, returning the path
    /// the resulting `File` value should carry.
    fn register_written(&self, pos: &SourcePosition, host_path: &Path)
        -> Result<String, WdlError>;

    fn stdout(&self, pos: &SourcePosition) -> Result<String, WdlError> {
        Err(WdlError::eval(
            pos.clone(),
            "stdout() is only available in task output evaluation",
        ))
    }

    fn stderr(&self, pos: &SourcePosition) -> Result<String, WdlError> {
        Err(WdlError::eval(
            pos.clone(),
            "stderr() is only available in task output evaluation",
        ))
    }

    /// Expand a glob pattern, returning sorted matching file paths.
    fn glob(&self, pos: &SourcePosition, pattern: &str) -> Result<Vec<String>, WdlError>;

    /// Size in bytes of the named file.
    fn size(&self, pos: &SourcePosition, path: &str) -> Result<u64, WdlError>;
}

/// Direct host file access, used outside any task context.
pub struct HostAccess;

impl FileAccess for HostAccess {
    fn readable_path(&self, _pos: &SourcePosition, path: &str) -> Result<PathBuf, WdlError> {
        Ok(PathBuf::from(path))
    }

    fn register_written(
        &self,
        _pos: &SourcePosition,
        host_path: &Path,
    ) -> Result<String, WdlError> {
        Ok(host_path.to_string_lossy().to_string())
    }

    fn glob(&self, pos: &SourcePosition, _pattern: &str) -> Result<Vec<String>, WdlError> {
        Err(WdlError::eval(
            pos.clone(),
            "glob() is only available in task output evaluation",
        ))
    }

    fn size(&self, pos: &SourcePosition, path: &str) -> Result<u64, WdlError> {
        std::fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| WdlError::eval(pos.clone(), format!("size({}): {}", path, e)))
    }
}

/// The function registry plus evaluation context.
pub struct StdLib {
    version: String,
    functions: HashMap<String, Box<dyn Function>>,
    access: Box<dyn FileAccess>,
    /// Directory where `write_*` functions materialize files.
    write_dir: PathBuf,
}

impl StdLib {
    /// Library for workflow-level evaluation: host file reads, no task
    /// stream/glob access.
    pub fn base(version: &str) -> Self {
        Self::with_access(version, Box::new(HostAccess), std::env::temp_dir())
    }

    /// Library with an explicit file access policy (task input or output
    /// flavors are built this way by the task runner).
    pub fn with_access(version: &str, access: Box<dyn FileAccess>, write_dir: PathBuf) -> Self {
        let mut lib = StdLib {
            version: version.to_string(),
            functions: HashMap::new(),
            access,
            write_dir,
        };
        lib.register_all();
        lib
    }

    pub fn get_function(&self, name: &str) -> Option<&dyn Function> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    pub fn register(&mut self, f: Box<dyn Function>) {
        self.functions.insert(f.name().to_string(), f);
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn access(&self) -> &dyn FileAccess {
        self.access.as_ref()
    }

    pub fn write_dir(&self) -> &Path {
        &self.write_dir
    }

    fn register_all(&mut self) {
        math::register(self);
        strings::register(self);
        arrays::register(self);
        map::register(self);
        io::register(self);
    }
}

/// A builtin with a fixed signature.
pub struct StaticFunction {
    name: String,
    arg_types: Vec<Type>,
    /// Arguments beyond this count are optional (their types still taken
    /// from `arg_types`).
    required: usize,
    return_type: Type,
    body: Box<dyn Fn(&SourcePosition, &[Value]) -> Result<Value, WdlError> + Send + Sync>,
}

impl StaticFunction {
    pub fn new<F>(name: &str, arg_types: Vec<Type>, return_type: Type, body: F) -> Box<dyn Function>
    where
        F: Fn(&SourcePosition, &[Value]) -> Result<Value, WdlError> + Send + Sync + 'static,
    {
        let required = arg_types.len();
        Box::new(StaticFunction {
            name: name.to_string(),
            arg_types,
            required,
            return_type,
            body: Box::new(body),
        })
    }

    /// Like [`StaticFunction::new`] but with trailing optional arguments.
    pub fn with_optional_args<F>(
        name: &str,
        arg_types: Vec<Type>,
        required: usize,
        return_type: Type,
        body: F,
    ) -> Box<dyn Function>
    where
        F: Fn(&SourcePosition, &[Value]) -> Result<Value, WdlError> + Send + Sync + 'static,
    {
        Box::new(StaticFunction {
            name: name.to_string(),
            arg_types,
            required,
            return_type,
            body: Box::new(body),
        })
    }
}

impl Function for StaticFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        if args.len() < self.required || args.len() > self.arg_types.len() {
            return Err(WdlError::WrongArity {
                pos: pos.clone(),
                function: self.name.clone(),
                expected: self.required,
                actual: args.len(),
            });
        }
        for (arg, expected) in args.iter_mut().zip(&self.arg_types) {
            let actual = arg.infer_type(ctx)?;
            if !actual.coerces(expected, ctx.check_quant) {
                return Err(WdlError::static_mismatch(
                    arg.pos().clone(),
                    expected.to_string(),
                    actual.to_string(),
                    "",
                ));
            }
        }
        Ok(self.return_type.clone())
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let mut values = Vec::with_capacity(args.len());
        for (arg, expected) in args.iter().zip(&self.arg_types) {
            values.push(arg.eval(env, stdlib)?.coerce(expected)?);
        }
        (self.body)(pos, &values)
    }
}

/// Evaluate argument expressions without any coercion (for polymorphic
/// functions that inspect runtime types themselves).
pub fn eval_args(
    args: &[Expression],
    env: &Bindings<Value>,
    stdlib: &StdLib,
) -> Result<Vec<Value>, WdlError> {
    args.iter().map(|a| a.eval(env, stdlib)).collect()
}

/// Require an exact argument count in a polymorphic `infer_type`.
pub fn check_arity(
    pos: &SourcePosition,
    function: &str,
    args: &[Expression],
    min: usize,
    max: usize,
) -> Result<(), WdlError> {
    if args.len() < min || args.len() > max {
        Err(WdlError::WrongArity {
            pos: pos.clone(),
            function: function.to_string(),
            expected: min,
            actual: args.len(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn pos() -> SourcePosition {
        SourcePosition::new("t.wdl".into(), "t.wdl".into(), 1, 1, 1, 2)
    }

    #[test]
    fn registry_has_core_functions() {
        let lib = StdLib::base("1.0");
        for name in [
            "floor",
            "ceil",
            "round",
            "length",
            "range",
            "select_first",
            "select_all",
            "flatten",
            "transpose",
            "zip",
            "cross",
            "prefix",
            "suffix",
            "basename",
            "sub",
            "defined",
            "size",
            "stdout",
            "stderr",
            "glob",
            "read_string",
            "read_lines",
            "write_lines",
            "read_json",
            "write_json",
            "keys",
            "as_map",
            "as_pairs",
        ] {
            assert!(lib.get_function(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn static_function_arity_and_types() {
        let lib = StdLib::base("1.0");
        let env: Bindings<Type> = Bindings::new();
        let structs = IndexMap::new();
        let ctx = TypeContext::new(&env, &lib, &structs);

        let floor = lib.get_function("floor").unwrap();
        let mut no_args: Vec<Expression> = vec![];
        assert!(matches!(
            floor.infer_type(&pos(), &mut no_args, &ctx),
            Err(WdlError::WrongArity { .. })
        ));

        let mut ok = vec![Expression::float(pos(), 2.5)];
        assert_eq!(
            floor.infer_type(&pos(), &mut ok, &ctx).unwrap().to_string(),
            "Int"
        );

        let mut bad = vec![Expression::boolean(pos(), true)];
        assert!(floor.infer_type(&pos(), &mut bad, &ctx).is_err());
    }

    #[test]
    fn host_access_blocks_task_functions() {
        let lib = StdLib::base("1.0");
        let env: Bindings<Value> = Bindings::new();
        let stdout = lib.get_function("stdout").unwrap();
        assert!(stdout.eval(&pos(), &[], &env, &lib).is_err());
        let glob = lib.get_function("glob").unwrap();
        let args = vec![Expression::string_literal(pos(), "*.txt")];
        assert!(glob.eval(&pos(), &args, &env, &lib).is_err());
    }
}
