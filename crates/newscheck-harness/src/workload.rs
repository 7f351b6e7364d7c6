//! The server scenario: index, rank, restart, rank, delete, rank.
//!
//! Each step is a hard gate. The first unexpected status code or malformed
//! ranking payload aborts the scenario with an error; stopping whatever server
//! is still live is the caller's job (see [`crate::supervisor`]).

use std::fmt;

use newscheck_core::config::RetryConfig;
use newscheck_core::schema::{self, PayloadKind};
use newscheck_core::{ArticleSet, Config, Error, Result};
use tracing::info;

use crate::http::{HttpOutcome, HttpRequest, RetryClient};
use crate::random::WorkloadRng;
use crate::supervisor::ServerControl;

/// Languages the ranking endpoint is queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LangCode {
    En,
    Ru,
}

impl LangCode {
    pub const ALL: [LangCode; 2] = [LangCode::En, LangCode::Ru];

    pub fn as_str(self) -> &'static str {
        match self {
            LangCode::En => "en",
            LangCode::Ru => "ru",
        }
    }
}

/// Categories the ranking endpoint is queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Any,
    Society,
    Economy,
    Technology,
    Sports,
    Entertainment,
    Science,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Any,
        Category::Society,
        Category::Economy,
        Category::Technology,
        Category::Sports,
        Category::Entertainment,
        Category::Science,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Any => "any",
            Category::Society => "society",
            Category::Economy => "economy",
            Category::Technology => "technology",
            Category::Sports => "sports",
            Category::Entertainment => "entertainment",
            Category::Science => "science",
            Category::Other => "other",
        }
    }
}

/// One `GET /threads` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingQuery {
    pub period_secs: u64,
    pub lang_code: LangCode,
    pub category: Category,
}

impl RankingQuery {
    pub fn path(&self) -> String {
        format!(
            "/threads?period={}&lang_code={}&category={}",
            self.period_secs,
            self.lang_code.as_str(),
            self.category.as_str()
        )
    }

    /// Threads must disclose their category only when none was requested.
    pub fn payload_kind(&self) -> PayloadKind {
        PayloadKind::RankedThreads {
            require_category: self.category == Category::Any,
        }
    }
}

/// Knobs for the scenario taken from the run configuration.
#[derive(Debug, Clone, Default)]
pub struct WorkloadOptions {
    pub retry: RetryConfig,
    pub echo_output: bool,
}

impl From<&Config> for WorkloadOptions {
    fn from(config: &Config) -> Self {
        Self {
            retry: config.retry.clone(),
            echo_output: config.echo_output,
        }
    }
}

/// Counters for a completed scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadSummary {
    pub indexed: usize,
    pub ranking_queries: usize,
    pub deletions: usize,
    pub server_starts: usize,
}

impl fmt::Display for WorkloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} articles indexed, {} ranking queries, {} deletions, {} server starts",
            self.indexed, self.ranking_queries, self.deletions, self.server_starts
        )
    }
}

/// Drives one server scenario against `server` on `port`.
pub struct ServerWorkload<'a, S: ServerControl> {
    server: &'a mut S,
    port: u16,
    articles: &'a ArticleSet,
    rng: &'a mut WorkloadRng,
    options: WorkloadOptions,
    summary: WorkloadSummary,
}

impl<'a, S: ServerControl> ServerWorkload<'a, S> {
    pub fn new(
        server: &'a mut S,
        port: u16,
        articles: &'a ArticleSet,
        rng: &'a mut WorkloadRng,
        options: WorkloadOptions,
    ) -> Self {
        Self {
            server,
            port,
            articles,
            rng,
            options,
            summary: WorkloadSummary::default(),
        }
    }

    pub fn run(mut self) -> Result<WorkloadSummary> {
        info!(
            "Server scenario: {} articles, seed {}",
            self.articles.len(),
            self.rng.seed()
        );

        let mut client = self.start_session()?;
        self.index_articles(&mut client)?;
        self.ranking_sweep(&mut client)?;
        self.server.stop()?;

        // State indexed before the restart must still be served after it.
        let mut client = self.start_session()?;
        self.ranking_sweep(&mut client)?;
        self.delete_articles(&mut client)?;
        self.ranking_sweep(&mut client)?;
        self.server.stop()?;

        Ok(self.summary)
    }

    /// Start the server with a fresh connection pool for it.
    fn start_session(&mut self) -> Result<RetryClient> {
        self.server.start(self.port)?;
        self.summary.server_starts += 1;
        RetryClient::connect(self.port, &self.options.retry)
    }

    fn index_articles(&mut self, client: &mut RetryClient) -> Result<()> {
        let articles = self.articles;
        for (name, path) in articles.iter() {
            let body = std::fs::read(path)?;
            let max_age = self.rng.period_secs();
            let request = HttpRequest::put(format!("/{name}"), body)
                .with_header("Content-Type", "text/html")
                .with_header("Cache-Control", format!("max-age={max_age}"));

            let outcome = client.request(&request)?;
            expect_status(&outcome, &[201, 204], "201 or 204")?;
            self.summary.indexed += 1;
        }
        Ok(())
    }

    fn ranking_sweep(&mut self, client: &mut RetryClient) -> Result<()> {
        for lang_code in LangCode::ALL {
            for category in Category::ALL {
                let query = RankingQuery {
                    period_secs: self.rng.period_secs(),
                    lang_code,
                    category,
                };

                let outcome = client.request(&HttpRequest::get(query.path()))?;
                expect_status(&outcome, &[200], "200")?;
                schema::validate(query.payload_kind(), &outcome.body).into_result()?;

                if self.options.echo_output {
                    info!("{}", outcome.body_text());
                }
                self.summary.ranking_queries += 1;
            }
        }
        Ok(())
    }

    fn delete_articles(&mut self, client: &mut RetryClient) -> Result<()> {
        let threshold = self.rng.deletion_threshold();
        info!("Deleting articles with probability {}/1000", threshold);

        let articles = self.articles;
        for (name, _) in articles.iter() {
            if !self.rng.should_delete(threshold) {
                continue;
            }
            let outcome = client.request(&HttpRequest::delete(format!("/{name}")))?;
            expect_status(&outcome, &[204, 404], "204 or 404")?;
            self.summary.deletions += 1;
        }
        Ok(())
    }
}

fn expect_status(outcome: &HttpOutcome, allowed: &[u16], expected: &str) -> Result<()> {
    if allowed.contains(&outcome.status) {
        return Ok(());
    }
    let body = outcome.body_text();
    Err(Error::Http {
        reason: format!(
            "Invalid HTTP code ({expected} expected): {}",
            outcome.status
        ),
        payload: (!body.is_empty()).then_some(body),
    })
}
