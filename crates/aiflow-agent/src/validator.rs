use std::collections::{HashMap, HashSet};

use aiflow_core::traits::ProjectValidator;
use aiflow_core::{Project, ValidationIssue};
use aiflow_expr::parse_expression;

/// Structural checks run before a flow may start.
///
/// Only broken wiring is an error. Dangling references, malformed
/// conditions and cycles are reported as warnings: the router treats them
/// as non-matching rules or bounds them with the step ceiling.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }
}

impl ProjectValidator for Validator {
    fn validate(&self, project: &Project) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let mut known: HashSet<&str> = HashSet::new();
        for agent in &project.agents {
            if !known.insert(agent.id.as_str()) {
                issues.push(ValidationIssue::error(
                    "DUPLICATE_AGENT_ID",
                    format!("Agent id '{}' is declared more than once", agent.id),
                ));
            }
        }
        known.extend(project.flow.agents.iter().map(String::as_str));

        let entry = project.flow.entry_agent.trim();
        if entry.is_empty() {
            issues.push(ValidationIssue::error(
                "MISSING_ENTRY_AGENT",
                "flow.entry_agent is not set",
            ));
        } else if !known.contains(entry) {
            issues.push(ValidationIssue::error(
                "UNKNOWN_ENTRY_AGENT",
                format!("Entry agent '{entry}' is not a declared agent"),
            ));
        }

        for (idx, rule) in project.flow.logic.iter().enumerate() {
            let label = if rule.id.is_empty() {
                format!("#{idx}")
            } else {
                rule.id.clone()
            };

            if rule.from.trim().is_empty() {
                issues.push(ValidationIssue::error(
                    "RULE_MISSING_FROM",
                    format!("Rule {label} has no 'from' agent"),
                ));
            } else if !known.contains(rule.from.as_str()) {
                issues.push(ValidationIssue::warning(
                    "RULE_UNKNOWN_FROM",
                    format!("Rule {label} starts at unknown agent '{}'", rule.from),
                ));
            }

            let to = rule.to.trim();
            if !to.is_empty() && !known.contains(to) {
                issues.push(ValidationIssue::warning(
                    "RULE_UNKNOWN_TO",
                    format!("Rule {label} targets unknown agent '{to}'"),
                ));
            }

            if let Err(e) = parse_expression(rule.effective_condition()) {
                issues.push(ValidationIssue::warning(
                    "INVALID_CONDITION",
                    format!("Rule {label} has an invalid condition: {e}"),
                ));
            }
        }

        for agent in &project.agents {
            for tool in &agent.tools {
                if !project.tools.contains_key(tool) {
                    issues.push(ValidationIssue::warning(
                        "UNKNOWN_TOOL",
                        format!("Agent '{}' uses undeclared tool '{tool}'", agent.id),
                    ));
                }
            }
        }

        if !entry.is_empty() {
            if let Some(cycle) = find_cycle(project, entry) {
                issues.push(ValidationIssue::warning(
                    "CYCLE_DETECTED",
                    format!(
                        "Cycle reachable from the entry agent: {}",
                        cycle.join(" -> ")
                    ),
                ));
            }
        }

        issues
    }
}

/// First cycle reachable from `entry`, as a closed path (`a -> b -> a`).
fn find_cycle<'a>(project: &'a Project, entry: &'a str) -> Option<Vec<&'a str>> {
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for rule in &project.flow.logic {
        let to = rule.to.trim();
        if !to.is_empty() {
            edges.entry(rule.from.as_str()).or_default().push(to);
        }
    }

    let mut done = HashSet::new();
    let mut path = Vec::new();
    dfs(entry, &edges, &mut path, &mut done)
}

fn dfs<'a>(
    node: &'a str,
    edges: &HashMap<&'a str, Vec<&'a str>>,
    path: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
) -> Option<Vec<&'a str>> {
    if let Some(pos) = path.iter().position(|n| *n == node) {
        let mut cycle = path[pos..].to_vec();
        cycle.push(node);
        return Some(cycle);
    }
    if done.contains(node) {
        return None;
    }

    path.push(node);
    for next in edges.get(node).into_iter().flatten() {
        if let Some(cycle) = dfs(*next, edges, path, done) {
            return Some(cycle);
        }
    }
    path.pop();
    done.insert(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiflow_core::{Agent, IssueLevel, Rule};

    fn codes(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.code.as_str()).collect()
    }

    #[test]
    fn test_support_project_is_clean() {
        let project = aiflow_test_utils::support_project();
        let issues = Validator.validate(&project);
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
    }

    #[test]
    fn test_entry_agent_errors() {
        let mut project = aiflow_test_utils::support_project();
        project.flow.entry_agent = String::new();
        assert_eq!(codes(&Validator.validate(&project)), vec!["MISSING_ENTRY_AGENT"]);

        project.flow.entry_agent = "ghost".into();
        let issues = Validator.validate(&project);
        assert_eq!(codes(&issues), vec!["UNKNOWN_ENTRY_AGENT"]);
        assert_eq!(issues[0].level, IssueLevel::Error);
    }

    #[test]
    fn test_duplicate_agents_and_rule_errors() {
        let mut project = aiflow_test_utils::support_project();
        project.agents.push(Agent::new("human"));
        project
            .flow
            .logic
            .push(Rule::new("r5", "", "human", "always"));
        project
            .flow
            .logic
            .push(Rule::new("r6", "billing", "nowhere", "amount >"));

        let issues = Validator.validate(&project);
        let found = codes(&issues);
        assert!(found.contains(&"DUPLICATE_AGENT_ID"));
        assert!(found.contains(&"RULE_MISSING_FROM"));
        assert!(found.contains(&"RULE_UNKNOWN_TO"));
        assert!(found.contains(&"INVALID_CONDITION"));

        let errors: Vec<_> = issues.iter().filter(|i| i.is_error()).collect();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_overly_nested_condition_is_invalid() {
        let mut project = aiflow_test_utils::support_project();
        let condition = format!("{}retry", "!".repeat(10_000));
        project
            .flow
            .logic
            .push(Rule::new("deep", "triage", "human", condition));

        let issues = Validator.validate(&project);
        let invalid: Vec<_> = issues
            .iter()
            .filter(|i| i.code == "INVALID_CONDITION")
            .collect();
        assert_eq!(invalid.len(), 1);
        assert!(invalid[0].message.contains("nests deeper than"));
        assert!(!invalid[0].is_error());
    }

    #[test]
    fn test_unknown_tool_and_unknown_from_are_warnings() {
        let mut project = aiflow_test_utils::support_project();
        project.agents[1].tools.push("ping".into());
        project
            .flow
            .logic
            .push(Rule::new("r7", "ghost", "human", "always"));

        let issues = Validator.validate(&project);
        assert_eq!(codes(&issues), vec!["RULE_UNKNOWN_FROM", "UNKNOWN_TOOL"]);
        assert!(issues.iter().all(|i| !i.is_error()));
    }

    #[test]
    fn test_reachable_cycle_is_a_warning() {
        let mut project = aiflow_test_utils::support_project();
        project
            .flow
            .logic
            .push(Rule::new("back", "human", "triage", "retry == true"));

        let issues = Validator.validate(&project);
        assert_eq!(codes(&issues), vec!["CYCLE_DETECTED"]);
        assert!(issues[0].message.contains("triage -> network -> human -> triage"));
    }

    #[test]
    fn test_unreachable_cycle_is_ignored() {
        let mut project = aiflow_test_utils::support_project();
        project.agents.push(Agent::new("x"));
        project.agents.push(Agent::new("y"));
        project.flow.logic.push(Rule::new("xy", "x", "y", ""));
        project.flow.logic.push(Rule::new("yx", "y", "x", ""));

        assert!(Validator.validate(&project).is_empty());
    }
}
