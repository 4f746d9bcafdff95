//! Nodos de decisión y su tabla de transiciones.
//!
//! Un `Decider` recibe las ejecuciones del elemento anterior y devuelve un
//! exit status; la primera transición cuyo patrón `on` encaja decide el
//! camino. Los patrones admiten `*` (cualquier secuencia) y `?` (un carácter).
use serde::{Deserialize, Serialize};

use super::ArtifactRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// Continúa en el nodo hermano `to`.
    Next { on: String, to: String },
    /// Termina el job como COMPLETED.
    End { on: String, exit_status: Option<String> },
    /// Termina el job como FAILED.
    Fail { on: String, exit_status: Option<String> },
    /// Termina el job como STOPPED.
    Stop { on: String, exit_status: Option<String> },
}

impl Transition {
    pub fn next(on: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Next { on: on.into(),
                     to: to.into() }
    }

    pub fn end(on: impl Into<String>) -> Self {
        Self::End { on: on.into(),
                    exit_status: None }
    }

    pub fn fail(on: impl Into<String>) -> Self {
        Self::Fail { on: on.into(),
                     exit_status: None }
    }

    pub fn stop(on: impl Into<String>) -> Self {
        Self::Stop { on: on.into(),
                     exit_status: None }
    }

    pub fn pattern(&self) -> &str {
        match self {
            Self::Next { on, .. } | Self::End { on, .. } | Self::Fail { on, .. } | Self::Stop { on, .. } => on,
        }
    }

    pub fn matches(&self, exit_status: &str) -> bool {
        matches_exit_status(self.pattern(), exit_status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub decider: ArtifactRef,
    pub transitions: Vec<Transition>,
}

impl Decision {
    pub fn new(decider: impl Into<ArtifactRef>) -> Self {
        Self { decider: decider.into(),
               transitions: Vec::new() }
    }

    pub fn transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Primera transición que encaja con `exit_status`, en orden declarado.
    pub fn select(&self, exit_status: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.matches(exit_status))
    }
}

/// Glob de exit status: `*` cualquier secuencia (incluida vacía), `?` un
/// carácter exacto.
pub fn matches_exit_status(pattern: &str, value: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let v: Vec<char> = value.chars().collect();
    let (mut pi, mut vi) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;
    while vi < v.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == v[vi]) {
            pi += 1;
            vi += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = vi;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            vi = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
