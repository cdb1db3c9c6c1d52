//! Terminal output of the `advisers` tool, styled with `console`.
//!
//! [`Report`] prints compiled plan nodes, dispatch results and errors.
//! Adviser parameters are printed as their JSON text.

use console::Style;

use pipeline_advisers::duration::format_duration;
use pipeline_advisers::state_machine::{Advice, NodeExecution};
use pipeline_advisers::{Plan, PlanNode};

pub struct Report {
    heading: Style,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            heading: Style::new().cyan().bold(),
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }
}

impl Report {
    pub fn plan(&self, plan: &Plan) {
        for node in plan.iter() {
            self.plan_node(node);
        }
        println!(
            "{}",
            self.dim.apply_to(format!("{} step(s) compiled", plan.len()))
        );
    }

    pub fn plan_node(&self, node: &PlanNode) {
        println!(
            "{} {} {}",
            self.heading.apply_to("───"),
            self.heading.apply_to(&node.name),
            self.dim.apply_to(format!("[{}] {}", node.step_type, node.uuid))
        );
        println!(
            "  timeout {}  when {}",
            format_duration(node.timeout),
            node.when_condition.expression()
        );
        if let Some(skip) = &node.skip_condition {
            println!("  skip when {skip}");
        }
        for (scope, target) in &node.rollback_strategy {
            println!("  rollback {scope} -> {target}");
        }
        if node.adviser_obtainments.is_empty() {
            println!("  {}", self.yellow.apply_to("no advisers"));
        }
        for (position, obtainment) in node.adviser_obtainments.iter().enumerate() {
            println!(
                "  {}. {} {}",
                position + 1,
                self.green.apply_to(obtainment.adviser_type),
                String::from_utf8_lossy(&obtainment.parameters)
            );
        }
        println!();
    }

    pub fn advice(&self, label: &str, state: &impl NodeExecution, advice: &Advice) {
        let kinds: Vec<String> = state
            .failure_kinds()
            .iter()
            .map(ToString::to_string)
            .collect();
        let situation = format!(
            "{label}: {} [{}] after {} retr{}",
            state.status(),
            kinds.join(", "),
            state.retry_attempt(),
            if state.retry_attempt() == 1 { "y" } else { "ies" }
        );
        match advice {
            Advice::Advised { by, directive } => println!(
                "  {} {situation}\n      {} {}",
                self.green.apply_to("→"),
                self.dim.apply_to(format!("{by}:")),
                directive
            ),
            Advice::NoMatch => println!(
                "  {} {situation}\n      {}",
                self.yellow.apply_to("?"),
                self.yellow.apply_to("no adviser matched; engine default applies")
            ),
        }
    }

    pub fn error(&self, err: &anyhow::Error) {
        eprintln!("{} {err:#}", self.red.apply_to("✗"));
    }
}
