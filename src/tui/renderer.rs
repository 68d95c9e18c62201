//! Styled terminal output

use crossterm::style::Stylize;
use std::io::Write;

use super::theme::Theme;
use crate::analysis::ContentStructure;
use crate::optimization::OptimizationStats;
use crate::relay::{RelayState, SessionReport};
use crate::templates::{PromptTemplate, ScoreBreakdown};

/// Terminal renderer for streamed answers and analysis output
pub struct TerminalRenderer {
    theme: Theme,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::with_theme(Theme::default())
    }

    pub fn with_theme(theme: Theme) -> Self {
        Self { theme }
    }

    /// Render the banner shown before a streamed answer
    pub fn render_banner(&self, version: &str, model: &str, endpoint: &str) {
        println!();
        println!(
            "  {} {}",
            "prompt-relay".with(self.theme.title),
            format!("v{}", version).with(self.theme.dim)
        );
        println!(
            "  {} {} {}",
            "Upstream:".with(self.theme.dim),
            model.with(self.theme.stats),
            format!("({})", endpoint).with(self.theme.dim),
        );
        println!();
    }

    /// Render a streaming text delta
    pub fn render_delta(&self, text: &str) {
        print!("{}", text.with(self.theme.assistant));
        let _ = std::io::stdout().flush();
    }

    /// One-line outcome after a session ends
    pub fn render_session(&self, report: &SessionReport) {
        let marker = match report.state {
            RelayState::Done => "\u{2713}".with(self.theme.success),
            RelayState::Timeout => "\u{23f1}".with(self.theme.system),
            _ => "\u{2717}".with(self.theme.error),
        };
        let persisted = if report.persisted { "saved" } else { "not saved" };
        println!(
            "\n  {} {} [{}] {} chars, {} {}",
            marker,
            report.state.to_string().with(self.theme.stats),
            format!("{:?}", report.termination).with(self.theme.dim),
            format!("{}", report.streamed_chars).with(self.theme.stats),
            persisted.with(self.theme.dim),
            report.message_id.as_str().with(self.theme.dim),
        );
        println!();
    }

    pub fn render_optimization(&self, stats: &OptimizationStats) {
        println!(
            "  {} {} -> {} tokens ({:.1}% reduction)",
            "\u{2022}".with(self.theme.dim),
            format!("{}", stats.original_tokens).with(self.theme.stats),
            format!("{}", stats.optimized_tokens).with(self.theme.stats),
            stats.reduction_percent,
        );
        if let Some(template) = &stats.template {
            println!("    {} {}", "template:".with(self.theme.dim), template.as_str());
        }
        if let Some(strategy) = stats.strategy {
            println!("    {} {}", "strategy:".with(self.theme.dim), strategy);
        }
    }

    pub fn render_structure(&self, structure: &ContentStructure) {
        if let Some(reason) = &structure.error {
            self.render_error(reason);
            return;
        }

        let counts = [
            ("Code blocks", structure.code_blocks.len()),
            ("Paragraphs", structure.paragraphs.len()),
            ("Headers", structure.headers.len()),
            ("List items", structure.lists.len()),
            ("Links", structure.links.len()),
        ];
        for (label, count) in counts {
            println!(
                "  {:<12} {}",
                label.with(self.theme.dim),
                format!("{}", count).with(self.theme.stats)
            );
        }

        for (language, probability) in &structure.language_probabilities {
            if *probability > 0.0 {
                println!(
                    "  {:<12} {:.0}%",
                    language.as_str().with(self.theme.command),
                    probability * 100.0
                );
            }
        }
        for header in &structure.headers {
            println!("    {}", header.as_str().with(self.theme.title));
        }
    }

    /// Template table, optionally with the score each template got for some content
    pub fn render_templates(&self, templates: &[(PromptTemplate, Option<ScoreBreakdown>)]) {
        println!(
            "  {:<4} {:<20} {:<9} {:<11} {:>6} {:>6} {:>8}",
            "id", "name", "type", "strategy", "tokens", "uses", "score"
        );
        println!("  {}", "-".repeat(70).with(self.theme.dim));
        for (template, breakdown) in templates {
            let score = match breakdown {
                Some(b) => format!("{:.1}", b.total),
                None => format!("{:.1}", template.average_score),
            };
            println!(
                "  {:<4} {:<20} {:<9} {:<11} {:>6} {:>6} {:>8}",
                template.id,
                template.name,
                template.template_type,
                template.compression_strategy.as_str(),
                template.estimated_tokens,
                template.usage_count,
                score.with(self.theme.stats),
            );
        }
    }

    /// Render a system message
    pub fn render_system(&self, msg: &str) {
        println!(
            "  {} {}",
            "\u{25b6}".with(self.theme.system),
            msg.with(self.theme.system)
        );
    }

    /// Render an error message
    pub fn render_error(&self, msg: &str) {
        eprintln!(
            "  {} {}",
            "\u{2717}".with(self.theme.error),
            msg.with(self.theme.error)
        );
    }

    /// Render a success message
    pub fn render_success(&self, msg: &str) {
        println!(
            "  {} {}",
            "\u{2713}".with(self.theme.success),
            msg.with(self.theme.success)
        );
    }

    /// Render info text
    pub fn render_info(&self, msg: &str) {
        println!("  {}", msg.with(self.theme.dim));
    }
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self::new()
    }
}
