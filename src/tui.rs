use crate::models::{Listing, RemovedListing};
use crate::render;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, Write};

/// Colored terminal output for refresh runs and snapshot browsing.
pub struct RefreshTUI<W: Write = io::Stdout> {
    out: W,
    searches_done: usize,
    searches_failed: usize,
    total_new: usize,
    total_removed: usize,
}

impl RefreshTUI<io::Stdout> {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Default for RefreshTUI<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> RefreshTUI<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            out,
            searches_done: 0,
            searches_failed: 0,
            total_new: 0,
            total_removed: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, color: Color, text: impl std::fmt::Display) -> io::Result<()> {
        execute!(
            self.out,
            SetForegroundColor(color),
            Print(format!("{}\n", text)),
            ResetColor
        )
    }

    pub fn start_search(&mut self, name: &str, store: &str) -> io::Result<()> {
        self.line(Color::White, format!("⏳ Refreshing {} ({})", name, store))
    }

    pub fn show_loaded(&mut self, prior: Option<usize>) -> io::Result<()> {
        match prior {
            Some(count) => self.line(Color::DarkGrey, format!("📁 Loaded {} existing listings", count)),
            None => self.line(Color::DarkGrey, "📁 No stored snapshot yet, every listing counts as new"),
        }
    }

    pub fn show_fetched(&mut self, count: usize) -> io::Result<()> {
        self.line(Color::DarkGrey, format!("✓ Fetched {} listings", count))
    }

    pub fn show_new(&mut self, listings: &[&Listing]) -> io::Result<()> {
        self.total_new += listings.len();
        for listing in listings {
            let text = format!(
                "  {} | {} | {} | {}",
                render::display_title(listing),
                listing.price,
                listing.floor_plan,
                listing.address
            );
            self.line(Color::Green, text)?;
        }
        Ok(())
    }

    pub fn show_removed(&mut self, removed: &[RemovedListing]) -> io::Result<()> {
        self.total_removed += removed.len();
        if removed.is_empty() {
            return Ok(());
        }
        self.line(Color::Red, format!("🗑  {} listings removed:", removed.len()))?;
        for line in render::removed_table(removed) {
            self.line(Color::Red, format!("  {}", line))?;
        }
        Ok(())
    }

    pub fn finish_search(&mut self, name: &str, new: usize, removed: usize, total: usize) -> io::Result<()> {
        self.searches_done += 1;
        self.line(
            Color::Green,
            format!(
                "✅ {}: {} new, {} removed | stored: {} total",
                name, new, removed, total
            ),
        )
    }

    /// A search whose fetch stopped at the page cap; its snapshot was not saved.
    pub fn show_truncated(&mut self, name: &str) -> io::Result<()> {
        self.searches_done += 1;
        self.line(
            Color::Yellow,
            format!("⚠️  {}: stopped at the page cap, snapshot not saved", name),
        )
    }

    pub fn fail_search(&mut self, name: &str, error: &anyhow::Error) -> io::Result<()> {
        self.searches_failed += 1;
        self.line(Color::Red, format!("❌ {}: {:#}", name, error))
    }

    pub fn show_final_summary(&mut self) -> io::Result<()> {
        execute!(self.out, Print("─".repeat(80)), Print("\n"))?;
        self.line(
            Color::Green,
            format!(
                "Refreshed {} searches: {} new, {} removed",
                self.searches_done, self.total_new, self.total_removed
            ),
        )?;
        if self.searches_failed > 0 {
            let failed = self.searches_failed;
            self.line(Color::Red, format!("{} searches failed, their snapshots were left unchanged", failed))?;
        }
        Ok(())
    }

    /// List view followed by one detail block per listing.
    pub fn show_snapshot(&mut self, name: &str, listings: &[Listing]) -> io::Result<()> {
        self.line(Color::White, format!("📋 {}: {} listings", name, listings.len()))?;
        for (listing, line) in listings.iter().zip(render::listing_table(listings)) {
            let color = if listing.is_new() { Color::Green } else { Color::Grey };
            self.line(color, line)?;
        }
        execute!(self.out, Print("\n"))?;
        for listing in listings {
            execute!(self.out, Print(render::detail_block(listing)), Print("---\n"))?;
        }
        Ok(())
    }
}
