//! File I/O builtins: `read_*`, `write_*`, `glob`, `stdout`, `stderr`, and
//! `size`.
//!
//! All host file access is mediated by the library's [`FileAccess`] policy,
//! which is what distinguishes task-input evaluation (reads restricted to
//! the input path map) from task-output evaluation (stream capture and glob
//! over the finished working directory) from plain workflow-level
//! evaluation.

use super::{check_arity, eval_args, Function, StdLib};
use crate::env::Bindings;
use crate::error::{SourcePosition, WdlError};
use crate::expr::typecheck::TypeContext;
use crate::expr::Expression;
use crate::types::Type;
use crate::value::Value;
use indexmap::IndexMap;
use std::io::Write;

pub fn register(lib: &mut StdLib) {
    lib.register(Box::new(ReadFileAs {
        name: "read_string",
        kind: ReadKind::Text,
    }));
    lib.register(Box::new(ReadFileAs {
        name: "read_int",
        kind: ReadKind::Int,
    }));
    lib.register(Box::new(ReadFileAs {
        name: "read_float",
        kind: ReadKind::Float,
    }));
    lib.register(Box::new(ReadFileAs {
        name: "read_boolean",
        kind: ReadKind::Boolean,
    }));
    lib.register(Box::new(ReadLines));
    lib.register(Box::new(ReadTsv));
    lib.register(Box::new(ReadMap));
    lib.register(Box::new(ReadJson));
    lib.register(Box::new(ReadObjects { plural: false }));
    lib.register(Box::new(ReadObjects { plural: true }));

    lib.register(Box::new(WriteLines));
    lib.register(Box::new(WriteTsv));
    lib.register(Box::new(WriteMap));
    lib.register(Box::new(WriteJson));
    lib.register(Box::new(WriteObjects { plural: false }));
    lib.register(Box::new(WriteObjects { plural: true }));

    lib.register(Box::new(Glob));
    lib.register(Box::new(Stream { stderr: false }));
    lib.register(Box::new(Stream { stderr: true }));
    lib.register(Box::new(Size));
}

/// Read a `File`-coercible argument's contents through the access policy.
fn slurp(
    pos: &SourcePosition,
    value: &Value,
    stdlib: &StdLib,
) -> Result<String, WdlError> {
    let file = value.coerce(&Type::file(false))?;
    let path = file.as_string().unwrap();
    let host = stdlib.access().readable_path(pos, path)?;
    std::fs::read_to_string(&host)
        .map_err(|e| WdlError::eval(pos.clone(), format!("cannot read {}: {}", path, e)))
}

fn strip_trailing_newline(mut s: String) -> String {
    if s.ends_with('\n') {
        s.pop();
        if s.ends_with('\r') {
            s.pop();
        }
    }
    s
}

/// Materialize content under the library's write directory and register the
/// new file with the access policy.
fn write_file(
    pos: &SourcePosition,
    stdlib: &StdLib,
    suffix: &str,
    content: &str,
) -> Result<Value, WdlError> {
    let dir = stdlib.write_dir();
    std::fs::create_dir_all(dir)
        .map_err(|e| WdlError::eval(pos.clone(), format!("cannot create {}: {}", dir.display(), e)))?;
    let mut tmp = tempfile::Builder::new()
        .prefix("wdl_")
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(|e| WdlError::eval(pos.clone(), format!("cannot create temp file: {}", e)))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| WdlError::eval(pos.clone(), format!("cannot write temp file: {}", e)))?;
    let (_, path) = tmp
        .keep()
        .map_err(|e| WdlError::eval(pos.clone(), format!("cannot persist temp file: {}", e)))?;
    let registered = stdlib.access().register_written(pos, &path)?;
    Ok(Value::file(registered))
}

enum ReadKind {
    Text,
    Int,
    Float,
    Boolean,
}

/// `read_string` / `read_int` / `read_float` / `read_boolean`.
struct ReadFileAs {
    name: &'static str,
    kind: ReadKind,
}

impl Function for ReadFileAs {
    fn name(&self) -> &str {
        self.name
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, self.name, args, 1, 1)?;
        args[0].typecheck(&Type::file(false), ctx)?;
        Ok(match self.kind {
            ReadKind::Text => Type::string(false),
            ReadKind::Int => Type::int(false),
            ReadKind::Float => Type::float(false),
            ReadKind::Boolean => Type::boolean(false),
        })
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?;
        let content = slurp(pos, &v, stdlib)?;
        match self.kind {
            ReadKind::Text => Ok(Value::string(strip_trailing_newline(content))),
            ReadKind::Int => content.trim().parse::<i64>().map(Value::int).map_err(|_| {
                WdlError::eval(pos.clone(), format!("read_int(): not an integer: {:?}", content.trim()))
            }),
            ReadKind::Float => content.trim().parse::<f64>().map(Value::float).map_err(|_| {
                WdlError::eval(pos.clone(), format!("read_float(): not a number: {:?}", content.trim()))
            }),
            ReadKind::Boolean => {
                let t = content.trim();
                if t.eq_ignore_ascii_case("true") {
                    Ok(Value::boolean(true))
                } else if t.eq_ignore_ascii_case("false") {
                    Ok(Value::boolean(false))
                } else {
                    Err(WdlError::eval(
                        pos.clone(),
                        format!("read_boolean(): not a boolean: {:?}", t),
                    ))
                }
            }
        }
    }
}

struct ReadLines;

impl Function for ReadLines {
    fn name(&self) -> &str {
        "read_lines"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, "read_lines", args, 1, 1)?;
        args[0].typecheck(&Type::file(false), ctx)?;
        Ok(Type::array(Type::string(false), false, false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?;
        let content = slurp(pos, &v, stdlib)?;
        Ok(Value::array(
            Type::string(false),
            content.lines().map(|l| Value::string(l.to_string())).collect(),
        ))
    }
}

struct ReadTsv;

impl Function for ReadTsv {
    fn name(&self) -> &str {
        "read_tsv"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, "read_tsv", args, 1, 1)?;
        args[0].typecheck(&Type::file(false), ctx)?;
        Ok(Type::array(
            Type::array(Type::string(false), false, false),
            false,
            false,
        ))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?;
        let content = slurp(pos, &v, stdlib)?;
        let rows: Vec<Value> = content
            .lines()
            .map(|line| {
                Value::array(
                    Type::string(false),
                    line.split('\t').map(|c| Value::string(c.to_string())).collect(),
                )
            })
            .collect();
        Ok(Value::array(
            Type::array(Type::string(false), false, false),
            rows,
        ))
    }
}

struct ReadMap;

impl Function for ReadMap {
    fn name(&self) -> &str {
        "read_map"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, "read_map", args, 1, 1)?;
        args[0].typecheck(&Type::file(false), ctx)?;
        Ok(Type::map(Type::string(false), Type::string(false), false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?;
        let content = slurp(pos, &v, stdlib)?;
        let mut pairs: Vec<(Value, Value)> = Vec::new();
        for line in content.lines() {
            let mut cols = line.split('\t');
            let k = cols.next().unwrap_or_default();
            let val = cols.next().ok_or_else(|| {
                WdlError::eval(pos.clone(), format!("read_map(): missing value column in {:?}", line))
            })?;
            if cols.next().is_some() {
                return Err(WdlError::eval(
                    pos.clone(),
                    format!("read_map(): more than two columns in {:?}", line),
                ));
            }
            if pairs.iter().any(|(seen, _)| seen.as_string() == Some(k)) {
                return Err(WdlError::eval(
                    pos.clone(),
                    format!("read_map(): duplicate key {:?}", k),
                ));
            }
            pairs.push((Value::string(k.to_string()), Value::string(val.to_string())));
        }
        Ok(Value::map(Type::string(false), Type::string(false), pairs))
    }
}

struct ReadJson;

impl Function for ReadJson {
    fn name(&self) -> &str {
        "read_json"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, "read_json", args, 1, 1)?;
        args[0].typecheck(&Type::file(false), ctx)?;
        // the concrete type is only known at runtime
        Ok(Type::any())
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?;
        let content = slurp(pos, &v, stdlib)?;
        let json: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| WdlError::eval(pos.clone(), format!("read_json(): {}", e)))?;
        Ok(Value::from_json(json))
    }
}

/// `read_object` / `read_objects`: legacy header+rows TSV format.
struct ReadObjects {
    plural: bool,
}

impl Function for ReadObjects {
    fn name(&self) -> &str {
        if self.plural {
            "read_objects"
        } else {
            "read_object"
        }
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, self.name(), args, 1, 1)?;
        args[0].typecheck(&Type::file(false), ctx)?;
        let obj = Type::object(IndexMap::new());
        Ok(if self.plural {
            Type::array(obj, false, false)
        } else {
            obj
        })
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?;
        let content = slurp(pos, &v, stdlib)?;
        let mut lines = content.lines();
        let header: Vec<&str> = lines
            .next()
            .ok_or_else(|| WdlError::eval(pos.clone(), format!("{}(): empty file", self.name())))?
            .split('\t')
            .collect();
        let mut objects = Vec::new();
        for line in lines {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() != header.len() {
                return Err(WdlError::eval(
                    pos.clone(),
                    format!("{}(): row width differs from header", self.name()),
                ));
            }
            let members: IndexMap<String, Value> = header
                .iter()
                .zip(cols)
                .map(|(h, c)| (h.to_string(), Value::string(c.to_string())))
                .collect();
            objects.push(Value::object(members));
        }
        if self.plural {
            Ok(Value::array(Type::object(IndexMap::new()), objects))
        } else {
            match objects.len() {
                1 => Ok(objects.into_iter().next().unwrap()),
                n => Err(WdlError::eval(
                    pos.clone(),
                    format!("read_object(): expected exactly one row, found {}", n),
                )),
            }
        }
    }
}

struct WriteLines;

impl Function for WriteLines {
    fn name(&self) -> &str {
        "write_lines"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, "write_lines", args, 1, 1)?;
        args[0].typecheck(&Type::array(Type::string(false), false, false), ctx)?;
        Ok(Type::file(false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0]
            .eval(env, stdlib)?
            .coerce(&Type::array(Type::string(false), false, false))?;
        let mut content = String::new();
        for line in v.as_array().unwrap() {
            content.push_str(line.as_string().unwrap());
            content.push('\n');
        }
        write_file(pos, stdlib, ".txt", &content)
    }
}

struct WriteTsv;

impl Function for WriteTsv {
    fn name(&self) -> &str {
        "write_tsv"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, "write_tsv", args, 1, 1)?;
        args[0].typecheck(
            &Type::array(Type::array(Type::string(false), false, false), false, false),
            ctx,
        )?;
        Ok(Type::file(false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?.coerce(&Type::array(
            Type::array(Type::string(false), false, false),
            false,
            false,
        ))?;
        let mut content = String::new();
        for row in v.as_array().unwrap() {
            let cols: Vec<&str> = row
                .as_array()
                .unwrap()
                .iter()
                .map(|c| c.as_string().unwrap())
                .collect();
            content.push_str(&cols.join("\t"));
            content.push('\n');
        }
        write_file(pos, stdlib, ".tsv", &content)
    }
}

struct WriteMap;

impl Function for WriteMap {
    fn name(&self) -> &str {
        "write_map"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, "write_map", args, 1, 1)?;
        args[0].typecheck(
            &Type::map(Type::string(false), Type::string(false), false),
            ctx,
        )?;
        Ok(Type::file(false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0]
            .eval(env, stdlib)?
            .coerce(&Type::map(Type::string(false), Type::string(false), false))?;
        let mut content = String::new();
        for (k, val) in v.as_map_pairs().unwrap() {
            content.push_str(k.as_string().unwrap());
            content.push('\t');
            content.push_str(val.as_string().unwrap());
            content.push('\n');
        }
        write_file(pos, stdlib, ".tsv", &content)
    }
}

struct WriteJson;

impl Function for WriteJson {
    fn name(&self) -> &str {
        "write_json"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, "write_json", args, 1, 1)?;
        args[0].infer_type(ctx)?;
        Ok(Type::file(false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?;
        let content = serde_json::to_string(&v.to_json())
            .map_err(|e| WdlError::eval(pos.clone(), format!("write_json(): {}", e)))?;
        write_file(pos, stdlib, ".json", &content)
    }
}

struct WriteObjects {
    plural: bool,
}

impl Function for WriteObjects {
    fn name(&self) -> &str {
        if self.plural {
            "write_objects"
        } else {
            "write_object"
        }
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, self.name(), args, 1, 1)?;
        args[0].infer_type(ctx)?;
        Ok(Type::file(false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?;
        let objects: Vec<&Value> = if self.plural {
            v.as_array()
                .ok_or_else(|| WdlError::eval(pos.clone(), "write_objects() of non-array"))?
                .iter()
                .collect()
        } else {
            vec![&v]
        };
        let mut content = String::new();
        let mut header: Option<Vec<String>> = None;
        for obj in objects {
            let members = obj.as_struct_members().ok_or_else(|| {
                WdlError::eval(pos.clone(), format!("{}(): not an object", self.name()))
            })?;
            let keys: Vec<String> = members.keys().cloned().collect();
            match &header {
                None => {
                    content.push_str(&keys.join("\t"));
                    content.push('\n');
                    header = Some(keys);
                }
                Some(h) if *h == keys => {}
                Some(_) => {
                    return Err(WdlError::eval(
                        pos.clone(),
                        "write_objects(): objects have differing members",
                    ))
                }
            }
            let row: Result<Vec<String>, WdlError> = members
                .values()
                .map(|m| {
                    m.coerce(&Type::string(false))
                        .map(|s| s.as_string().unwrap().to_string())
                })
                .collect();
            content.push_str(&row?.join("\t"));
            content.push('\n');
        }
        write_file(pos, stdlib, ".tsv", &content)
    }
}

/// `glob(pattern)`: files under the task working directory, sorted.
struct Glob;

impl Function for Glob {
    fn name(&self) -> &str {
        "glob"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, "glob", args, 1, 1)?;
        args[0].typecheck(&Type::string(false), ctx)?;
        Ok(Type::array(Type::file(false), false, false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let pattern = args[0]
            .eval(env, stdlib)?
            .coerce(&Type::string(false))?
            .as_string()
            .unwrap()
            .to_string();
        if pattern.starts_with('/') || pattern.split('/').any(|seg| seg == "..") {
            return Err(WdlError::eval(
                pos.clone(),
                format!("glob() pattern must be relative without ..: {:?}", pattern),
            ));
        }
        let mut matches = stdlib.access().glob(pos, &pattern)?;
        matches.sort();
        Ok(Value::array(
            Type::file(false),
            matches.into_iter().map(Value::file).collect(),
        ))
    }
}

/// `stdout()` / `stderr()`: the task's captured streams.
struct Stream {
    stderr: bool,
}

impl Function for Stream {
    fn name(&self) -> &str {
        if self.stderr {
            "stderr"
        } else {
            "stdout"
        }
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        _ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, self.name(), args, 0, 0)?;
        Ok(Type::file(false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        _args: &[Expression],
        _env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let path = if self.stderr {
            stdlib.access().stderr(pos)?
        } else {
            stdlib.access().stdout(pos)?
        };
        Ok(Value::file(path))
    }
}

/// `size(File|Array[File]?[, unit])`: total bytes of all files in the value,
/// optionally scaled.
struct Size;

fn unit_divisor(pos: &SourcePosition, unit: &str) -> Result<f64, WdlError> {
    let d: f64 = match unit.to_ascii_uppercase().as_str() {
        "B" => 1.0,
        "K" | "KB" => 1e3,
        "M" | "MB" => 1e6,
        "G" | "GB" => 1e9,
        "T" | "TB" => 1e12,
        "KI" | "KIB" => 1024.0,
        "MI" | "MIB" => 1024.0 * 1024.0,
        "GI" | "GIB" => 1024.0 * 1024.0 * 1024.0,
        "TI" | "TIB" => 1024.0f64.powi(4),
        _ => {
            return Err(WdlError::eval(
                pos.clone(),
                format!("size(): unknown unit {:?}", unit),
            ))
        }
    };
    Ok(d)
}

impl Function for Size {
    fn name(&self) -> &str {
        "size"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, "size", args, 1, 2)?;
        let t = args[0].infer_type(ctx)?;
        let ok = match &t {
            Type::File { .. } | Type::String { .. } | Type::Directory { .. } | Type::Any { .. } => {
                true
            }
            Type::Array { item, .. } => item.coerces(&Type::file(true), false),
            _ => false,
        };
        if !ok {
            return Err(WdlError::static_mismatch(
                args[0].pos().clone(),
                "File, Array[File], or optional thereof".to_string(),
                t.to_string(),
                "",
            ));
        }
        if args.len() == 2 {
            let (_, rest) = args.split_at_mut(1);
            rest[0].typecheck(&Type::string(false), ctx)?;
        }
        Ok(Type::float(false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let values = eval_args(args, env, stdlib)?;
        let divisor = match values.get(1) {
            Some(u) => unit_divisor(pos, u.coerce(&Type::string(false))?.as_string().unwrap())?,
            None => 1.0,
        };
        let mut paths = Vec::new();
        match &values[0] {
            Value::String { value } => paths.push((value.clone(), false)),
            other => other.collect_paths(&mut paths),
        }
        let mut total: u64 = 0;
        for (path, _is_dir) in &paths {
            total += stdlib.access().size(pos, path)?;
        }
        Ok(Value::float(total as f64 / divisor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn pos() -> SourcePosition {
        SourcePosition::new("t.wdl".into(), "t.wdl".into(), 1, 1, 1, 2)
    }

    fn lib_in(dir: &tempfile::TempDir) -> StdLib {
        StdLib::with_access("1.0", Box::new(super::super::HostAccess), dir.path().to_path_buf())
    }

    fn call(lib: &StdLib, name: &str, args: Vec<Expression>) -> Result<Value, WdlError> {
        let env = Bindings::new();
        lib.get_function(name).unwrap().eval(&pos(), &args, &env, lib)
    }

    fn file_arg(path: &PathBuf) -> Expression {
        Expression::string_literal(pos(), path.to_string_lossy().to_string())
    }

    #[test]
    fn read_functions() {
        let dir = tempfile::TempDir::new().unwrap();
        let lib = lib_in(&dir);
        let p = dir.path().join("data.txt");
        std::fs::write(&p, "hello world\n").unwrap();
        assert_eq!(
            call(&lib, "read_string", vec![file_arg(&p)]).unwrap().as_string(),
            Some("hello world")
        );

        std::fs::write(&p, "42\n").unwrap();
        assert_eq!(
            call(&lib, "read_int", vec![file_arg(&p)]).unwrap().as_int(),
            Some(42)
        );
        std::fs::write(&p, "oops").unwrap();
        assert!(call(&lib, "read_int", vec![file_arg(&p)]).is_err());

        std::fs::write(&p, "TRUE").unwrap();
        assert_eq!(
            call(&lib, "read_boolean", vec![file_arg(&p)]).unwrap().as_bool(),
            Some(true)
        );
    }

    #[test]
    fn lines_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let lib = lib_in(&dir);
        let arr = Expression::array(
            pos(),
            vec![
                Expression::string_literal(pos(), "a"),
                Expression::string_literal(pos(), "b"),
            ],
        );
        let f = call(&lib, "write_lines", vec![arr]).unwrap();
        let back = call(
            &lib,
            "read_lines",
            vec![Expression::string_literal(pos(), f.as_string().unwrap())],
        )
        .unwrap();
        let lines = back.as_array().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].as_string(), Some("b"));
    }

    #[test]
    fn tsv_and_map_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let lib = lib_in(&dir);
        let p = dir.path().join("table.tsv");
        std::fs::write(&p, "a\t1\nb\t2\n").unwrap();
        let tsv = call(&lib, "read_tsv", vec![file_arg(&p)]).unwrap();
        assert_eq!(
            tsv.as_array().unwrap()[1].as_array().unwrap()[1].as_string(),
            Some("2")
        );

        let m = call(&lib, "read_map", vec![file_arg(&p)]).unwrap();
        assert_eq!(m.as_map_pairs().unwrap().len(), 2);

        std::fs::write(&p, "a\t1\na\t2\n").unwrap();
        assert!(call(&lib, "read_map", vec![file_arg(&p)]).is_err());
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let lib = lib_in(&dir);
        let arr = Expression::array(
            pos(),
            vec![Expression::int(pos(), 1), Expression::int(pos(), 2)],
        );
        let f = call(&lib, "write_json", vec![arr]).unwrap();
        let back = call(
            &lib,
            "read_json",
            vec![Expression::string_literal(pos(), f.as_string().unwrap())],
        )
        .unwrap();
        assert_eq!(back.as_array().unwrap().len(), 2);
    }

    #[test]
    fn objects_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let lib = lib_in(&dir);
        let p = dir.path().join("objs.tsv");
        std::fs::write(&p, "name\tcount\nalpha\t1\nbeta\t2\n").unwrap();
        let objs = call(&lib, "read_objects", vec![file_arg(&p)]).unwrap();
        let members = objs.as_array().unwrap()[1].as_struct_members().unwrap();
        assert_eq!(members.get("name").unwrap().as_string(), Some("beta"));

        // single-row file via read_object
        std::fs::write(&p, "k\nv\n").unwrap();
        let one = call(&lib, "read_object", vec![file_arg(&p)]).unwrap();
        assert!(one.as_struct_members().is_some());
    }

    #[test]
    fn glob_rejects_escapes() {
        let dir = tempfile::TempDir::new().unwrap();
        let lib = lib_in(&dir);
        assert!(call(
            &lib,
            "glob",
            vec![Expression::string_literal(pos(), "/etc/*")]
        )
        .is_err());
        assert!(call(
            &lib,
            "glob",
            vec![Expression::string_literal(pos(), "../*")]
        )
        .is_err());
    }

    #[test]
    fn size_with_units() {
        let dir = tempfile::TempDir::new().unwrap();
        let lib = lib_in(&dir);
        let p = dir.path().join("payload.bin");
        std::fs::write(&p, vec![0u8; 2048]).unwrap();
        let bytes = call(&lib, "size", vec![file_arg(&p)]).unwrap();
        assert_eq!(bytes.as_float(), Some(2048.0));
        let kib = call(
            &lib,
            "size",
            vec![file_arg(&p), Expression::string_literal(pos(), "KiB")],
        )
        .unwrap();
        assert_eq!(kib.as_float(), Some(2.0));
        assert!(call(
            &lib,
            "size",
            vec![file_arg(&p), Expression::string_literal(pos(), "parsecs")]
        )
        .is_err());
    }
}
