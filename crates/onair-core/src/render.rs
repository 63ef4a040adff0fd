//! Turns the canonical record into display text.
//!
//! Two modes: literal `%artist`/`%title` templates, and a small whitelisted
//! expression language with duration helpers. Expressions are compiled once
//! per settings snapshot; rendering never fails outward, errors become the
//! configured fallback text.

mod context;
mod eval;
mod lexer;
mod parser;
mod template;
mod value;

use chrono::{DateTime, Utc};
use onair_detect::MediaRecord;
use tracing::warn;

use crate::config::{DisplayConfig, DisplayMode};
use crate::error::RenderError;

pub use context::{Name, RenderContext};
pub use parser::Function;
pub use template::Template;
pub use value::{format_duration, round_duration, Value};

/// A compiled display expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: parser::Expr,
}

impl Expression {
    pub fn compile(source: &str) -> Result<Self, RenderError> {
        Ok(Self {
            source: source.to_string(),
            root: parser::parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, ctx: &RenderContext<'_>) -> Result<Value, RenderError> {
        eval::eval(&self.root, ctx)
    }
}

/// What the display settings compile to.
#[derive(Debug, Clone, PartialEq)]
pub enum Renderer {
    Template(Template),
    Expression(Expression),
    /// The expression did not compile; every render yields the fallback.
    Invalid { reason: RenderError },
}

impl Renderer {
    pub fn from_config(display: &DisplayConfig) -> Self {
        match display.mode {
            DisplayMode::Template => Renderer::Template(Template::new(display.text.clone())),
            DisplayMode::Expression => Self::compile(&display.expr),
        }
    }

    pub fn compile(source: &str) -> Self {
        match Expression::compile(source) {
            Ok(expr) => Renderer::Expression(expr),
            Err(e) => {
                warn!("Display expression rejected: {e}");
                Renderer::Invalid { reason: e }
            }
        }
    }

    pub fn try_render(
        &self,
        record: Option<&MediaRecord>,
        now: DateTime<Utc>,
    ) -> Result<String, RenderError> {
        match self {
            Renderer::Template(template) => Ok(template.render(record)),
            Renderer::Expression(expr) => {
                let value = expr.evaluate(&RenderContext::new(record, now))?;
                Ok(value.to_string())
            }
            Renderer::Invalid { reason } => Err(reason.clone()),
        }
    }

    /// Render, substituting `fallback` for any error.
    pub fn render(
        &self,
        record: Option<&MediaRecord>,
        now: DateTime<Utc>,
        fallback: &str,
    ) -> String {
        match self.try_render(record, now) {
            Ok(text) => text,
            Err(e) => {
                warn!("Render failed, showing fallback: {e}");
                fallback.to_string()
            }
        }
    }
}
