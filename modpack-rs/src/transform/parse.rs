//! Parsing and code generation on top of swc.
//!
//! Every module gets its own [`SourceMap`]; replacement nodes are produced by
//! parsing small generated snippets into the same map, so their spans never
//! collide with the module's own.

use std::path::Path;

use anyhow::anyhow;
use deno_ast::swc::ast::{EsVersion, Expr, Module, ModuleItem};
use deno_ast::swc::codegen::text_writer::JsWriter;
use deno_ast::swc::codegen::{Config as CodegenConfig, Emitter};
use deno_ast::swc::common::comments::SingleThreadedComments;
use deno_ast::swc::common::sync::Lrc;
use deno_ast::swc::common::{FileName, SourceFile, SourceMap};
use deno_ast::swc::parser::lexer::Lexer;
use deno_ast::swc::parser::{EsSyntax, Parser, StringInput, Syntax};

fn syntax() -> Syntax {
    Syntax::Es(EsSyntax {
        import_attributes: true,
        allow_return_outside_function: true,
        ..Default::default()
    })
}

fn parser_for<'a>(
    source_file: &'a SourceFile,
    comments: &'a SingleThreadedComments,
) -> Parser<Lexer<'a>> {
    let input = StringInput::from(source_file);
    let lexer = Lexer::new(syntax(), EsVersion::EsNext, input, Some(comments));
    Parser::new_from(lexer)
}

fn new_file(source_map: &Lrc<SourceMap>, path: Option<&Path>, text: String) -> Lrc<SourceFile> {
    let file_name = match path {
        Some(path) => FileName::Real(path.to_path_buf()),
        None => FileName::Anon,
    };
    source_map.new_source_file(file_name.into(), text)
}

/// Parses `text` as an ES module.
pub fn parse_module(
    source_map: &Lrc<SourceMap>,
    path: Option<&Path>,
    text: String,
) -> anyhow::Result<Module> {
    let source_file = new_file(source_map, path, text);
    let comments = SingleThreadedComments::default();
    parser_for(&source_file, &comments)
        .parse_module()
        .map_err(|e| anyhow!("Parse error in {}: {:?}", describe(path), e))
}

/// Parses `text` as a classic script and wraps its statements in a module
/// node, so both kinds share the rewriting and emitting code.
pub fn parse_script(
    source_map: &Lrc<SourceMap>,
    path: Option<&Path>,
    text: String,
) -> anyhow::Result<Module> {
    let source_file = new_file(source_map, path, text);
    let comments = SingleThreadedComments::default();
    let script = parser_for(&source_file, &comments)
        .parse_script()
        .map_err(|e| anyhow!("Parse error in {}: {:?}", describe(path), e))?;

    Ok(Module {
        span: script.span,
        body: script.body.into_iter().map(ModuleItem::Stmt).collect(),
        shebang: None,
    })
}

/// Parses a generated expression.
pub fn parse_expr(source_map: &Lrc<SourceMap>, text: &str) -> anyhow::Result<Box<Expr>> {
    let source_file = new_file(source_map, None, text.to_string());
    let comments = SingleThreadedComments::default();
    parser_for(&source_file, &comments)
        .parse_expr()
        .map_err(|e| anyhow!("Parse error in generated expression `{}`: {:?}", text, e))
}

/// Parses generated module items.
pub fn parse_items(source_map: &Lrc<SourceMap>, text: &str) -> anyhow::Result<Vec<ModuleItem>> {
    Ok(parse_module(source_map, None, text.to_string())?.body)
}

/// Generates code for `module`.
pub fn emit_module(
    source_map: &Lrc<SourceMap>,
    module: &Module,
    minify: bool,
) -> anyhow::Result<String> {
    let mut buf = Vec::new();
    {
        let cfg = CodegenConfig::default()
            .with_minify(minify)
            .with_target(EsVersion::EsNext)
            .with_omit_last_semi(false);

        let mut emitter = Emitter {
            cfg,
            cm: source_map.clone(),
            comments: None,
            wr: Box::new(JsWriter::new(source_map.clone(), "\n", &mut buf, None)),
        };

        emitter.emit_module(module)?;
    }

    Ok(String::from_utf8(buf)?)
}

fn describe(path: Option<&Path>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => "generated code".to_string(),
    }
}
