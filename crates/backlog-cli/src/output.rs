use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    // Widths count chars so Korean titles line up as well as they can
    let width = |s: &str| s.chars().count();
    let mut widths: Vec<usize> = headers.iter().map(|h| width(h)).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(width(cell));
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  ").trim_end());

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

// ---------------------------------------------------------------------------
// Batch results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mark {
    Ok,
    Skipped,
    Failed,
}

impl Mark {
    fn symbol(self) -> &'static str {
        match self {
            Mark::Ok => "✓",
            Mark::Skipped => "⊘",
            Mark::Failed => "✗",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ItemResult {
    pub item: String,
    pub result: Mark,
    pub detail: String,
}

/// Per-item results of a batch. Lines print as they happen unless the run
/// is in JSON mode, where everything is emitted by `finish`.
pub struct Tally {
    json: bool,
    dry_run: bool,
    results: Vec<ItemResult>,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct Counts {
    pub ok: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Tally {
    pub fn new(json: bool, dry_run: bool) -> Self {
        Self {
            json,
            dry_run,
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, item: &str, result: Mark, detail: impl Into<String>) {
        let detail = detail.into();
        if !self.json {
            if detail.is_empty() {
                println!("  {} {item}", result.symbol());
            } else {
                println!("  {} {item}: {detail}", result.symbol());
            }
        }
        self.results.push(ItemResult {
            item: item.to_string(),
            result,
            detail,
        });
    }

    pub fn ok(&mut self, item: &str, detail: impl Into<String>) {
        self.record(item, Mark::Ok, detail);
    }

    pub fn skip(&mut self, item: &str, detail: impl Into<String>) {
        self.record(item, Mark::Skipped, detail);
    }

    pub fn fail(&mut self, item: &str, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::warn!(item, error = %detail, "item failed");
        self.record(item, Mark::Failed, detail);
    }

    pub fn counts(&self) -> Counts {
        let mut counts = Counts::default();
        for r in &self.results {
            match r.result {
                Mark::Ok => counts.ok += 1,
                Mark::Skipped => counts.skipped += 1,
                Mark::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Print the closing count line, or the whole batch as JSON.
    pub fn finish(self) -> anyhow::Result<()> {
        let counts = self.counts();
        if self.json {
            return print_json(&serde_json::json!({
                "dry_run": self.dry_run,
                "results": self.results,
                "counts": counts,
            }));
        }
        let prefix = if self.dry_run { "Dry run: " } else { "" };
        println!(
            "{prefix}{} succeeded, {} skipped, {} failed",
            counts.ok, counts.skipped, counts.failed
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_each_mark() {
        let mut tally = Tally::new(true, false);
        tally.ok("GAM-1", "done");
        tally.skip("GAM-2", "");
        tally.fail("GAM-3", "404");
        tally.fail("GAM-4", "404");
        assert_eq!(
            tally.counts(),
            Counts {
                ok: 1,
                skipped: 1,
                failed: 2
            }
        );
    }
}
