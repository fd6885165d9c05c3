//! Scan-code generation for a single statement domain.

use super::query::{IslQuery, OmegaQuery};
use super::subst::SubstitutionContext;
use super::{check_response, Dialect, Solver};
use crate::polyhedral::formula::Formula;
use crate::utils::errors::PdfgResult;

/// One solver round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    /// Statement label
    pub label: String,
    /// Query text sent to the solver
    pub query: String,
    /// Raw solver response
    pub response: String,
}

/// Turns statement domains into restored scan code.
pub struct Scanner {
    solver: Box<dyn Solver>,
    context: SubstitutionContext,
    skip_guard: bool,
    transcript: Vec<ScanRecord>,
}

impl Scanner {
    /// Scanner over `solver`.
    pub fn new(solver: Box<dyn Solver>) -> Self {
        Self {
            solver,
            context: SubstitutionContext::new(),
            skip_guard: true,
            transcript: Vec::new(),
        }
    }

    /// Start from existing substitution state.
    pub fn with_context(mut self, context: SubstitutionContext) -> Self {
        self.context = context;
        self
    }

    /// Drop a guard that wraps the whole scan.
    pub fn with_skip_guard(mut self, skip_guard: bool) -> Self {
        self.skip_guard = skip_guard;
        self
    }

    /// Query language of the underlying solver.
    pub fn dialect(&self) -> Dialect {
        self.solver.dialect()
    }

    /// Substitution state shared by all scans.
    pub fn context(&self) -> &SubstitutionContext {
        &self.context
    }

    /// Mutable substitution state.
    pub fn context_mut(&mut self) -> &mut SubstitutionContext {
        &mut self.context
    }

    /// Solver round trips made so far.
    pub fn transcript(&self) -> &[ScanRecord] {
        &self.transcript
    }

    /// Generate scan code visiting `domain`, invoking the `label` macro.
    pub fn scan(&mut self, label: &str, domain: &str) -> PdfgResult<Vec<String>> {
        let domain = if domain.contains('*') || domain.contains('/') {
            self.context.replace_consts(domain)
        } else {
            domain.to_string()
        };
        let formula = Formula::parse(&domain)?;
        let statements = vec![label.to_string()];

        let (query, code) = match self.solver.dialect() {
            Dialect::Omega => {
                let query = OmegaQuery::new(label, &formula, &mut self.context)?;
                let text = query.to_string();
                let response = self.solver.run(&text)?;
                let checked = check_response(&response)?;
                let code = query.reformat(checked, &statements);
                let code = self.context.restore_calls(&code);
                self.record(label, &text, &response);
                (text, code)
            }
            Dialect::Isl => {
                let query = IslQuery::new(label, &formula, &mut self.context);
                let text = query.to_string();
                let response = self.solver.run(&text)?;
                let checked = check_response(&response)?;
                let code = self.context.decode_scan(checked, &query.iterators);
                self.record(label, &text, &response);
                (text, code)
            }
        };

        let code = self.context.restore_consts(&code);
        let mut lines: Vec<String> = code
            .lines()
            .map(|l| l.trim_end().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if self.skip_guard {
            lines = strip_guard(lines);
        }
        log::debug!("Scan for '{}' ({} lines) from query:\n{}", label, lines.len(), query);
        Ok(lines)
    }

    fn record(&mut self, label: &str, query: &str, response: &str) {
        self.transcript.push(ScanRecord {
            label: label.to_string(),
            query: query.to_string(),
            response: response.to_string(),
        });
    }
}

/// Remove an `if (...) {` ... `}` pair enclosing every other line.
pub fn strip_guard(lines: Vec<String>) -> Vec<String> {
    let wrapped = lines.len() >= 2
        && lines[0].trim_start().starts_with("if")
        && lines[0].trim_end().ends_with('{')
        && lines[lines.len() - 1].trim() == "}";
    if !wrapped {
        return lines;
    }

    // the opening brace must close on the last line
    let mut depth = 0i32;
    for (n, line) in lines.iter().enumerate() {
        for c in line.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }
        if depth == 0 && n + 1 < lines.len() {
            return lines;
        }
    }

    let inner = &lines[1..lines.len() - 1];
    inner
        .iter()
        .map(|l| l.strip_prefix("  ").unwrap_or(l).to_string())
        .collect()
}
