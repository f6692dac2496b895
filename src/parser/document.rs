//! Document parsing (version directive, imports, struct typedefs, tasks,
//! workflow) and the recursive import loader.

use super::keywords::gates;
use super::lexer::Lexer;
use super::statements::parse_workflow;
use super::stream::TokenStream;
use super::tasks::parse_task;
use super::tokens::{RawStringPart, Token};
use super::types::parse_type;
use crate::error::{SourcePosition, WdlError};
use crate::tree::{Document, Import, StructTypeDef};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Read the `version` directive from the leading lines (comments allowed
/// above it). Absent directive means draft-2.
pub fn detect_version(source: &str) -> String {
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("version") {
            let v = rest.trim().split_whitespace().next().unwrap_or("");
            if !v.is_empty() {
                return v.to_string();
            }
        }
        break;
    }
    "draft-2".to_string()
}

/// Parse a WDL document from source text. Imports are left unloaded.
pub fn parse_document(source: &str, uri: &str, abspath: &str) -> Result<Document, WdlError> {
    let version = detect_version(source);
    let lexer = Lexer::new(uri, abspath, &version);
    let tokens = lexer.tokenize(source)?;
    let mut stream = TokenStream::new(tokens, uri, abspath, &version);

    let doc_pos = stream.pos();

    // consume the version directive tokens (everything on its line)
    if matches!(stream.peek(), Some(Token::Keyword(k)) if k == "version") {
        let line = stream.pos().line;
        stream.next();
        while !stream.at_end() && stream.pos().line == line {
            stream.next();
        }
    }

    let mut imports: Vec<Import> = Vec::new();
    let mut structs: Vec<StructTypeDef> = Vec::new();
    let mut tasks = Vec::new();
    let mut workflow = None;

    while !stream.at_end() {
        match stream.peek() {
            Some(Token::Keyword(k)) if k == "import" => {
                imports.push(parse_import(&mut stream, uri)?);
            }
            Some(Token::Keyword(k)) if k == "struct" => {
                if !gates(&version).structs {
                    return Err(stream.error("struct typedefs require WDL 1.0 or later"));
                }
                structs.push(parse_struct(&mut stream)?);
            }
            Some(Token::Keyword(k)) if k == "task" => {
                tasks.push(parse_task(&mut stream)?);
            }
            Some(Token::Keyword(k)) if k == "workflow" => {
                let wf = parse_workflow(&mut stream)?;
                if workflow.replace(wf).is_some() {
                    return Err(stream.error("document contains more than one workflow"));
                }
            }
            _ => {
                return Err(stream.error(format!(
                    "expected import, struct, task, or workflow; found {}",
                    stream.describe_next()
                )))
            }
        }
    }

    Ok(Document {
        pos: doc_pos,
        uri: uri.to_string(),
        abspath: abspath.to_string(),
        wdl_version: version,
        imports,
        structs,
        struct_typedefs: IndexMap::new(),
        tasks,
        workflow,
    })
}

fn parse_import(stream: &mut TokenStream, doc_uri: &str) -> Result<Import, WdlError> {
    let pos = stream.pos();
    stream.expect_keyword("import")?;
    let uri = match stream.next().map(|t| t.token) {
        Some(Token::StringLit(parts)) => {
            let mut s = String::new();
            for p in parts {
                match p {
                    RawStringPart::Text(t) => s.push_str(&t),
                    RawStringPart::Placeholder(_) => {
                        return Err(WdlError::syntax(
                            pos,
                            "import URI must be a literal string",
                            stream.version(),
                        ))
                    }
                }
            }
            s
        }
        _ => return Err(stream.error("expected quoted URI after import")),
    };
    let namespace = if stream.accept_keyword("as") {
        stream.expect_ident()?
    } else {
        default_namespace(&uri).ok_or_else(|| {
            WdlError::Import {
                pos: pos.clone(),
                uri: uri.clone(),
                message: format!(
                    "cannot derive an import namespace from {:?}; add `as <name>` (importing into {})",
                    uri, doc_uri
                ),
            }
        })?
    };
    let mut aliases = Vec::new();
    while stream.accept_keyword("alias") {
        let from = stream.expect_ident()?;
        stream.expect_keyword("as")?;
        let to = stream.expect_ident()?;
        aliases.push((from, to));
    }
    Ok(Import {
        pos,
        uri,
        namespace,
        aliases,
        doc: None,
    })
}

/// Basename of the URI minus the `.wdl` extension, when that forms a valid
/// identifier.
fn default_namespace(uri: &str) -> Option<String> {
    let base = uri.rsplit('/').next()?;
    let stem = base.strip_suffix(".wdl").unwrap_or(base);
    let valid = !stem.is_empty()
        && stem.chars().next().unwrap().is_ascii_alphabetic()
        && stem.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Some(stem.to_string())
    } else {
        None
    }
}

fn parse_struct(stream: &mut TokenStream) -> Result<StructTypeDef, WdlError> {
    let pos = stream.pos();
    stream.expect_keyword("struct")?;
    let name = stream.expect_ident()?;
    stream.expect(&Token::LBrace)?;
    let mut members = IndexMap::new();
    while !stream.accept(&Token::RBrace) {
        let member_pos = stream.pos();
        let ty = parse_type(stream)?;
        let member = stream.expect_ident()?;
        if members.insert(member.clone(), ty).is_some() {
            return Err(WdlError::MultipleDefinitions {
                pos: member_pos,
                message: format!("duplicate struct member {}", member),
            });
        }
        stream.accept(&Token::Comma);
    }
    Ok(StructTypeDef {
        pos,
        name,
        members,
        imported: false,
    })
}

/// Parse source text and typecheck it, without loading imports. Convenient
/// for single-file documents.
pub fn parse_and_check(source: &str, uri: &str, check_quant: bool) -> Result<Document, WdlError> {
    let mut doc = parse_document(source, uri, uri)?;
    if !doc.imports.is_empty() {
        return Err(WdlError::Import {
            pos: doc.imports[0].pos.clone(),
            uri: doc.imports[0].uri.clone(),
            message: "imports require loading from the filesystem".to_string(),
        });
    }
    doc.typecheck(check_quant)?;
    Ok(doc)
}

/// Load a document from a file, recursively loading and typechecking its
/// imports first (so each document is checked in topological order).
pub fn load(path: &Path, check_quant: bool) -> Result<Document, WdlError> {
    let mut in_progress = HashSet::new();
    load_inner(path, check_quant, &mut in_progress)
}

fn load_inner(
    path: &Path,
    check_quant: bool,
    in_progress: &mut HashSet<PathBuf>,
) -> Result<Document, WdlError> {
    let abspath = path
        .canonicalize()
        .map_err(|e| WdlError::input(format!("cannot open {}: {}", path.display(), e)))?;
    if !in_progress.insert(abspath.clone()) {
        return Err(WdlError::input(format!(
            "circular import of {}",
            path.display()
        )));
    }
    let source = std::fs::read_to_string(&abspath)
        .map_err(|e| WdlError::input(format!("cannot read {}: {}", path.display(), e)))?;
    let mut doc = parse_document(
        &source,
        &path.display().to_string(),
        &abspath.display().to_string(),
    )?;

    let parent = abspath.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut imports = std::mem::take(&mut doc.imports);
    for import in imports.iter_mut() {
        if import.uri.contains("://") {
            return Err(WdlError::Import {
                pos: import.pos.clone(),
                uri: import.uri.clone(),
                message: "remote imports are not supported; fetch the file locally".to_string(),
            });
        }
        let sub_path = if Path::new(&import.uri).is_absolute() {
            PathBuf::from(&import.uri)
        } else {
            parent.join(&import.uri)
        };
        let subdoc = load_inner(&sub_path, check_quant, in_progress).map_err(|e| {
            WdlError::Import {
                pos: import.pos.clone(),
                uri: import.uri.clone(),
                message: e.to_string(),
            }
        })?;
        import.doc = Some(Box::new(subdoc));
    }
    doc.imports = imports;

    doc.typecheck(check_quant)?;
    in_progress.remove(&abspath);
    Ok(doc)
}
