//! Declarative build plan: an ordered stream of comments, raw directives,
//! variables and rules, rendered as POSIX-make text.
//!
//! The emitter builds the structured form; rendering is a separate,
//! deterministic step, so tests can assert on rules without parsing text.

pub mod native;
pub mod relative;

use std::fmt::Write as _;

/// Sentinel target with no prerequisites and no actions; depending on it
/// marks a target always-rebuild.
pub const FORCE: &str = "FORCE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub target: String,
    pub prerequisites: Vec<String>,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanItem {
    Comment(String),
    /// Pre-rendered line emitted verbatim (`$(shell …)`, `.PRECIOUS: …`,
    /// `-include …`).
    Raw(String),
    Variable { name: String, value: String },
    Rule(Rule),
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    items: Vec<PlanItem>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn comment(&mut self, text: impl Into<String>) {
        self.items.push(PlanItem::Comment(text.into()));
    }

    pub fn raw(&mut self, line: impl Into<String>) {
        self.items.push(PlanItem::Raw(line.into()));
    }

    pub fn declare_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.items.push(PlanItem::Variable {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn declare_target(
        &mut self,
        target: impl Into<String>,
        prerequisites: Vec<String>,
        actions: Vec<String>,
    ) {
        self.items.push(PlanItem::Rule(Rule {
            target: target.into(),
            prerequisites,
            actions,
        }));
    }

    pub fn items(&self) -> &[PlanItem] {
        &self.items
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.items.iter().filter_map(|item| match item {
            PlanItem::Rule(rule) => Some(rule),
            _ => None,
        })
    }

    pub fn find_rule(&self, target: &str) -> Option<&Rule> {
        self.rules().find(|rule| rule.target == target)
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.items.iter().find_map(|item| match item {
            PlanItem::Variable { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for item in &self.items {
            match item {
                PlanItem::Comment(text) => {
                    let _ = writeln!(out, "# {text}");
                }
                PlanItem::Raw(line) => {
                    let _ = writeln!(out, "{line}");
                }
                PlanItem::Variable { name, value } => {
                    let _ = writeln!(out, "{name} = {value}");
                }
                PlanItem::Rule(rule) => {
                    if rule.prerequisites.is_empty() {
                        let _ = writeln!(out, "{}:", rule.target);
                    } else {
                        let _ = writeln!(out, "{}: {}", rule.target, rule.prerequisites.join(" "));
                    }
                    for action in &rule.actions {
                        let _ = writeln!(out, "\t{action}");
                    }
                    out.push('\n');
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn renders_rules_and_variables() {
        let mut plan = Plan::new();
        plan.comment("gtest");
        plan.declare_variable("GTEST_ALL", "build/gtest-all.cc.o");
        plan.declare_target(
            "build/a.o",
            vec!["a.c".to_string()],
            vec!["gcc -c a.c -o build/a.o".to_string()],
        );
        assert_eq!(
            plan.render(),
            indoc! {"
                # gtest
                GTEST_ALL = build/gtest-all.cc.o
                build/a.o: a.c
                \tgcc -c a.c -o build/a.o

            "}
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut plan = Plan::new();
        plan.declare_target(FORCE, vec![], vec![]);
        plan.declare_target("clean", vec![], vec!["rm -rf build".to_string()]);
        assert_eq!(plan.render(), plan.render());
    }
}
