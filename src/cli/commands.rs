//! CLI command implementations
//!
//! Commands run on a current-thread runtime inside a `LocalSet`, which the
//! store's background draft persistence spawns onto. Output goes to the
//! given writers so that commands can be exercised in tests.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::LocalSet;
use tracing::info;

use crate::config::StoreSettings;
use crate::ledger::{FileLedgerStore, LedgerStore};
use crate::model::TypeRegistry;
use crate::observability::init_logging;
use crate::sorter::sort_transactions;
use crate::store::{EntityStore, StoreError, TransactionValidator};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::write_json;

#[derive(Debug, Serialize)]
struct TransactionLine<'a> {
    id: &'a str,
    date: i64,
    deps: &'a [String],
    version: u32,
    leaf: bool,
}

#[derive(Debug, Serialize)]
struct Summary {
    status: &'static str,
    command: &'static str,
    count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ids: Vec<String>,
}

/// Parse arguments and run the command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli)
}

pub fn run_command(cli: Cli) -> CliResult<()> {
    let settings_path = match &cli.command {
        Command::Inspect { .. } => None,
        Command::Verify { config, .. } | Command::Merge { config, .. } => config.clone(),
    };
    let settings = StoreSettings::load_or_default(settings_path.as_deref())?;
    init_logging(cli.log_level.as_deref().unwrap_or(&settings.log_level));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let local = LocalSet::new();
    local.block_on(&runtime, async {
        match cli.command {
            Command::Inspect { ledger } => inspect(&ledger, &mut stdout, &mut stderr).await,
            Command::Verify { ledger, .. } => verify(&ledger, &settings, &mut stdout).await,
            Command::Merge { ledger, from, .. } => {
                merge(&ledger, &from, &settings, &mut stdout).await
            }
        }
    })
}

/// Prints every reachable transaction in replay order, one JSON line each.
/// Unreachable transaction ids go to `err`.
pub async fn inspect<W: Write, E: Write>(ledger_dir: &Path, out: &mut W, err: &mut E) -> CliResult<()> {
    let ledger = open_existing(ledger_dir)?;
    let ordering = sort_transactions(ledger.fetch().await?)
        .map_err(StoreError::from)?;

    let leaves = ordering.leaf_ids();
    for tx in &ordering.transactions {
        write_json(
            out,
            &TransactionLine {
                id: &tx.id,
                date: tx.date,
                deps: &tx.deps,
                version: tx.version,
                leaf: leaves.contains(&tx.id),
            },
        )?;
    }
    for id in &ordering.excluded {
        writeln!(err, "unreachable: {}", id)?;
    }
    Ok(())
}

/// Validates every transaction without applying it. Stops at the first
/// integrity failure.
pub async fn verify<W: Write>(ledger_dir: &Path, settings: &StoreSettings, out: &mut W) -> CliResult<()> {
    let ledger = open_existing(ledger_dir)?;
    let config = settings.to_store_config()?;
    let validator = TransactionValidator::new(config.auth.as_deref(), config.encryption.as_deref());

    let transactions = ledger.fetch().await?;
    for tx in &transactions {
        validator.validate(tx).await?;
    }

    info!(event = "verify_ok", transactions = transactions.len());
    write_json(
        out,
        &Summary {
            status: "ok",
            command: "verify",
            count: transactions.len(),
            ids: Vec::new(),
        },
    )
}

/// Appends the transactions of `from_dir` that `ledger_dir` lacks, after
/// validating them with the configured keys.
pub async fn merge<W: Write>(
    ledger_dir: &Path,
    from_dir: &Path,
    settings: &StoreSettings,
    out: &mut W,
) -> CliResult<()> {
    let source = open_existing(from_dir)?;
    let incoming = source.fetch().await?;

    let target = FileLedgerStore::open(ledger_dir)?;
    let config = settings.to_store_config()?;
    let store = EntityStore::open(Arc::new(TypeRegistry::new()), target, config);
    let appended = store.merge(incoming).await?;

    write_json(
        out,
        &Summary {
            status: "ok",
            command: "merge",
            count: appended.len(),
            ids: appended,
        },
    )
}

fn open_existing(dir: &Path) -> CliResult<FileLedgerStore> {
    if !dir.is_dir() {
        return Err(CliError::config_error(format!(
            "ledger directory {} does not exist",
            dir.display()
        )));
    }
    Ok(FileLedgerStore::open(dir)?)
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use crate::ledger::{Payload, Transaction};
    use crate::store::build_envelope;
    use tempfile::TempDir;

    fn tx(id: &str, date: i64, deps: &[&str]) -> Transaction {
        let deps: Vec<String> = deps.iter().map(|d| d.to_string()).collect();
        let envelope = build_envelope(3, id, date, &deps, None, "[]").unwrap();
        Transaction {
            id: id.to_string(),
            date,
            deps,
            version: 3,
            signer: None,
            hash: crate::crypto::hash_sha256(&envelope),
            signature: None,
            payload: Payload::Text(envelope),
        }
    }

    async fn ledger_with(dir: &Path, txs: &[Transaction]) {
        let ledger = FileLedgerStore::open(dir).unwrap();
        ledger.append_many(txs).await.unwrap();
    }

    #[tokio::test]
    async fn test_inspect_prints_replay_order() {
        let dir = TempDir::new().unwrap();
        ledger_with(dir.path(), &[tx("b", 2, &["a"]), tx("a", 1, &[]), tx("z", 0, &["missing"])]).await;

        let mut out = Vec::new();
        let mut err = Vec::new();
        inspect(dir.path(), &mut out, &mut err).await.unwrap();

        let lines: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], "a");
        assert_eq!(lines[0]["leaf"], false);
        assert_eq!(lines[1]["id"], "b");
        assert_eq!(lines[1]["leaf"], true);
        assert_eq!(String::from_utf8(err).unwrap(), "unreachable: z\n");
    }

    #[tokio::test]
    async fn test_verify_reports_tampering() {
        let dir = TempDir::new().unwrap();
        let mut tampered = tx("b", 2, &["a"]);
        tampered.date = 3;
        ledger_with(dir.path(), &[tx("a", 1, &[]), tampered]).await;

        let mut out = Vec::new();
        let err = verify(dir.path(), &StoreSettings::default(), &mut out)
            .await
            .unwrap_err();
        assert_eq!(err.code(), CliErrorCode::IntegrityFailure);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_merge_appends_unknown_transactions() {
        let target = TempDir::new().unwrap();
        let source = TempDir::new().unwrap();
        ledger_with(target.path(), &[tx("a", 1, &[])]).await;
        ledger_with(source.path(), &[tx("a", 1, &[]), tx("b", 2, &["a"])]).await;

        let mut out = Vec::new();
        merge(target.path(), source.path(), &StoreSettings::default(), &mut out)
            .await
            .unwrap();

        let summary: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(summary["count"], 1);
        assert_eq!(summary["ids"][0], "b");

        let merged = FileLedgerStore::open(target.path()).unwrap();
        assert_eq!(merged.fetch().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_ledger_directory() {
        let dir = TempDir::new().unwrap();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let result = inspect(&dir.path().join("absent"), &mut out, &mut err).await;
        assert_eq!(result.unwrap_err().code(), CliErrorCode::ConfigError);
    }
}
