//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands};
use crate::config::ClientConfig;
use crate::error::{Result, ResultExt};
use crate::http::{RequestExecutor, RequestSpec};
use crate::pagination::Paginated;
use crate::store::TokenStore;
use crate::types::{JsonValue, ScopeSet};
use futures::StreamExt;
use serde::{Deserialize, Deserializer};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info};

/// Page of any shape, as long as it carries a top-level `next` link
#[derive(Debug, Clone)]
struct RawPage(JsonValue);

impl<'de> Deserialize<'de> for RawPage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(RawPage)
    }
}

impl RawPage {
    fn items(&self) -> Option<&Vec<JsonValue>> {
        self.0.get("items").and_then(JsonValue::as_array)
    }
}

impl Paginated for RawPage {
    fn next_link(&self) -> Option<&str> {
        self.0.get("next").and_then(JsonValue::as_str)
    }

    fn item_count(&self) -> usize {
        self.items().map_or(0, Vec::len)
    }
}

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        let config = self.load_config()?;
        let store = self
            .cli
            .token_file
            .clone()
            .or_else(|| config.token_file.clone())
            .map(TokenStore::new);

        let token = match &store {
            Some(store) => store.load().await?,
            None => None,
        };
        let executor = config.build_executor(token)?;
        let auth = executor.auth();
        if !auth.is_authorized().await && !auth.capabilities().refresh_token_required {
            auth.request_initial_token().await?;
        }
        let initial = auth.snapshot().await;
        let scopes = self.scopes();

        let outcome = match &self.cli.command {
            Commands::Get { path, query } => self.get(&executor, path, query, &scopes).await,
            Commands::Pages {
                path,
                query,
                max_extra_pages,
            } => {
                self.pages(&executor, path, query, *max_extra_pages, &scopes)
                    .await
            }
        };

        // Persist a renewed user token even when the command itself failed
        let persist = store
            .as_ref()
            .filter(|_| auth.capabilities().refresh_token_required);
        if let Some(store) = persist {
            let current = auth.snapshot().await;
            let changed = match (&initial, &current) {
                (Some(before), Some(after)) => !Arc::ptr_eq(before, after),
                (None, Some(_)) => true,
                _ => false,
            };
            if let Some(state) = current.filter(|_| changed) {
                store.save(&state).await?;
                info!(path = %store.path().display(), "saved renewed token");
            }
        }

        outcome
    }

    fn load_config(&self) -> Result<ClientConfig> {
        let config = match &self.cli.config {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::default(),
        };
        Ok(config.apply_env())
    }

    fn scopes(&self) -> ScopeSet {
        ScopeSet::parse(&self.cli.scopes.join(" "))
    }

    async fn get(
        &self,
        executor: &RequestExecutor,
        path: &str,
        query: &[(String, String)],
        scopes: &ScopeSet,
    ) -> Result<()> {
        let spec = with_query(RequestSpec::get(path), query);
        let value: JsonValue = executor
            .execute_json(&spec, scopes)
            .await
            .with_context(|| format!("GET {path} failed"))?;
        print_line(&value)
    }

    async fn pages(
        &self,
        executor: &RequestExecutor,
        path: &str,
        query: &[(String, String)],
        max_extra_pages: Option<usize>,
        scopes: &ScopeSet,
    ) -> Result<()> {
        let spec = with_query(RequestSpec::get(path), query);
        let first: RawPage = executor.execute_json(&spec, scopes).await?;

        let mut pages = std::pin::pin!(executor.extend_pages(first, max_extra_pages, scopes));
        let mut page_count = 0usize;
        let mut item_count = 0usize;

        while let Some(page) = pages.next().await {
            let page = page?;
            page_count += 1;
            item_count += page.item_count();
            match page.items() {
                Some(items) => items.iter().try_for_each(print_line)?,
                None => print_line(&page.0)?,
            }
        }

        debug!(pages = page_count, items = item_count, "walk finished");
        Ok(())
    }
}

fn with_query(mut spec: RequestSpec, query: &[(String, String)]) -> RequestSpec {
    for (key, value) in query {
        spec = spec.query(key, value);
    }
    spec
}

fn print_line(value: &JsonValue) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", serde_json::to_string(value)?)?;
    Ok(())
}
