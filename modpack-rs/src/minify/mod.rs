//! Pluggable minifiers.
//!
//! The bundler never minifies by itself: every step goes through an optional
//! [`Minify`] collaborator held in [`Minifiers`]. [`Minifiers::builtin`]
//! provides a default set.

use std::future::Future;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};

pub mod css;
pub mod javascript;
pub mod xml;

pub use css::{CssMinifier, CssRuleMinifier, CssSelectorMinifier};
pub use javascript::JavaScriptMinifier;
pub use xml::XmlMinifier;

/// Turns code into equivalent, smaller code.
pub trait Minify {
    fn minify(&self, code: String) -> LocalBoxFuture<'static, anyhow::Result<String>>;
}

impl<F, Fut> Minify for F
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = anyhow::Result<String>> + 'static,
{
    fn minify(&self, code: String) -> LocalBoxFuture<'static, anyhow::Result<String>> {
        self(code).boxed_local()
    }
}

/// One optional minifier per kind of code the bundler handles.
#[derive(Clone, Default)]
pub struct Minifiers {
    /// Whole artifact, ES module output.
    pub esm_javascript: Option<Rc<dyn Minify>>,
    /// Whole artifact, CommonJS output.
    pub commonjs_javascript: Option<Rc<dyn Minify>>,
    /// Imported stylesheets.
    pub css: Option<Rc<dyn Minify>>,
    /// Literals passed to `insertRule`, `replace` and `replaceSync`.
    pub css_rule: Option<Rc<dyn Minify>>,
    /// Literals passed to `matchMedia` and `querySelector(All)`.
    pub css_selector: Option<Rc<dyn Minify>>,
    /// SVG files inlined into stylesheets.
    pub xml: Option<Rc<dyn Minify>>,
}

impl Minifiers {
    /// No minification at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// The minifiers shipped with this crate.
    pub fn builtin() -> Self {
        Self {
            esm_javascript: Some(Rc::new(JavaScriptMinifier::esm())),
            commonjs_javascript: Some(Rc::new(JavaScriptMinifier::commonjs())),
            css: Some(Rc::new(CssMinifier)),
            css_rule: Some(Rc::new(CssRuleMinifier)),
            css_selector: Some(Rc::new(CssSelectorMinifier)),
            xml: Some(Rc::new(XmlMinifier)),
        }
    }

    /// Artifact minifier for the requested output format.
    pub fn javascript(&self, commonjs: bool) -> Option<&Rc<dyn Minify>> {
        if commonjs {
            self.commonjs_javascript.as_ref()
        } else {
            self.esm_javascript.as_ref()
        }
    }
}

/// Runs `minifier` on `code`, or returns `code` unchanged when there is none.
pub async fn apply(minifier: Option<&Rc<dyn Minify>>, code: String) -> anyhow::Result<String> {
    match minifier {
        Some(minifier) => minifier.minify(code).await,
        None => Ok(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closures_are_minifiers() {
        let upper: Rc<dyn Minify> = Rc::new(|code: String| async move {
            Ok::<_, anyhow::Error>(code.to_uppercase())
        });
        assert_eq!(apply(Some(&upper), "abc".to_string()).await.unwrap(), "ABC");
        assert_eq!(apply(None, "abc".to_string()).await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_minifier_errors_propagate() {
        let failing: Rc<dyn Minify> = Rc::new(|_code: String| async move {
            Err::<String, _>(anyhow::anyhow!("minifier crashed"))
        });
        let err = apply(Some(&failing), String::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "minifier crashed");
    }

    #[test]
    fn test_builtin_selects_by_format() {
        let minifiers = Minifiers::builtin();
        assert!(minifiers.javascript(true).is_some());
        assert!(minifiers.javascript(false).is_some());
        assert!(Minifiers::none().javascript(false).is_none());
    }
}
