//! Markdown rendering of the weekly summary

use std::fmt::Write;

use super::weekly::WeeklyMetrics;

fn signed(value: i64) -> String {
    if value > 0 {
        format!("+{}", value)
    } else {
        value.to_string()
    }
}

impl WeeklyMetrics {
    /// Render the summary as a markdown report section.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();

        // Writing to a String cannot fail
        let _ = writeln!(out, "## Weekly Metrics\n");
        let _ = writeln!(out, "### Summary");
        let _ = writeln!(out, "- **Total Commits**: {}", self.total_commits);
        let _ = writeln!(out, "- **Active Projects**: {}", self.active_projects);
        let _ = writeln!(out, "- **Active Days**: {} of 7", self.active_days);
        let _ = writeln!(out, "- **PRs/MRs Merged**: {}", self.prs_merged);
        let _ = writeln!(
            out,
            "- **Week-over-Week Change**: {} commits ({}%)",
            signed(self.week_over_week_change),
            signed(self.week_over_week_percent)
        );

        let _ = write!(out, "\n### Project Activity");
        for project in &self.top_projects {
            let _ = write!(
                out,
                "\n- **{}**: {} commits",
                project.service, project.commits
            );
        }

        if !self.commit_patterns.is_empty() {
            let _ = writeln!(out, "\n\n### Hourly Commit Distribution");
            for pattern in &self.commit_patterns {
                let _ = writeln!(
                    out,
                    "- {:02}:00-{:02}:00: {} commits",
                    pattern.hour,
                    pattern.hour + 1,
                    pattern.commits
                );
            }
        }

        if let Some(stats) = &self.deployment_stats {
            let _ = writeln!(out, "\n\n### Deployments");
            let _ = writeln!(out, "- **Total Deployments**: {}", stats.deployments);
            let _ = writeln!(out, "- **Successful**: {}", stats.successful_deployments);
            let _ = write!(out, "- **Failed**: {}", stats.failed_deployments);
        }

        out
    }
}
