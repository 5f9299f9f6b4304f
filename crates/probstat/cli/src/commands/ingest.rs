// Probstat
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Event ingestion from CSV files and streams.
//!
//! Rows are `entity,attr1,attr2`. Rows with any other number of fields are
//! skipped and counted. A field holding a comma or a double quote is wrapped
//! in double quotes with inner quotes doubled; other fields are taken
//! verbatim, so empty values are valid. Values cannot contain line breaks.

use super::CommandContext;
use anyhow::{Context, Result};
use probstat_core::StatsEngine;
use serde::Serialize;
use std::borrow::Cow;
use std::fs::File;
use std::future::Future;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub ingested: u64,
    pub skipped: u64,
}

impl IngestSummary {
    fn apply(&mut self, engine: &StatsEngine, line: &str) {
        match parse_row(line) {
            Some([entity_id, attr1, attr2]) => {
                engine.collect(&entity_id, &attr1, &attr2);
                self.ingested += 1;
            }
            None => {
                debug!("Skipping malformed row: {:?}", line);
                self.skipped += 1;
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IngestReport {
    #[serde(flatten)]
    pub summary: IngestSummary,
    pub unique_entities: u64,
    pub flushed: usize,
    pub flush_failures: usize,
}

/// Split one CSV row into exactly three fields.
///
/// Returns `None` for any other field count and for an unterminated or
/// misplaced closing quote.
pub fn parse_row(line: &str) -> Option<[Cow<'_, str>; 3]> {
    let mut rest = line.strip_suffix('\r').unwrap_or(line);
    let mut fields = Vec::with_capacity(3);
    loop {
        let (field, remainder) = next_field(rest)?;
        fields.push(field);
        match remainder {
            Some(remainder) => rest = remainder,
            None => break,
        }
    }
    fields.try_into().ok()
}

/// Next field of `input` and the text after its separating comma, if any
fn next_field(input: &str) -> Option<(Cow<'_, str>, Option<&str>)> {
    let Some(quoted) = input.strip_prefix('"') else {
        return Some(match input.split_once(',') {
            Some((field, rest)) => (Cow::Borrowed(field), Some(rest)),
            None => (Cow::Borrowed(input), None),
        });
    };

    let mut value = String::new();
    let mut chars = quoted.char_indices();
    while let Some((i, c)) = chars.next() {
        if c != '"' {
            value.push(c);
            continue;
        }
        let after = &quoted[i + 1..];
        if after.starts_with('"') {
            value.push('"');
            chars.next();
            continue;
        }
        if after.is_empty() {
            return Some((Cow::Owned(value), None));
        }
        return after.strip_prefix(',').map(|rest| (Cow::Owned(value), Some(rest)));
    }
    None
}

/// Join fields into one CSV row that [`parse_row`] reads back unchanged
pub fn format_row(fields: &[&str]) -> String {
    fields.iter().map(|field| quote_field(field)).collect::<Vec<_>>().join(",")
}

fn quote_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

pub fn ingest_reader<R: BufRead>(engine: &StatsEngine, reader: R, skip_header: bool) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if skip_header && index == 0 {
            continue;
        }
        summary.apply(engine, &line);
    }
    Ok(summary)
}

/// Ingest a CSV file with a header row, then flush once
pub fn ingest_file(ctx: &CommandContext, path: &Path) -> Result<IngestReport> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let summary = ingest_reader(ctx.engine(), BufReader::new(file), true)?;
    info!("Ingested {} rows from {} ({} skipped)", summary.ingested, path.display(), summary.skipped);

    let flush = ctx.coordinator.flush()?;
    if !flush.is_complete() {
        warn!("{} structures were not persisted", flush.failed.len());
    }

    Ok(IngestReport {
        summary,
        unique_entities: ctx.engine().count_unique_entities(),
        flushed: flush.written.len(),
        flush_failures: flush.failed.len(),
    })
}

/// Ingest rows from `reader` until EOF or until `shutdown` resolves
pub async fn ingest_stream<R, F>(engine: &StatsEngine, reader: R, skip_header: bool, shutdown: F) -> Result<IngestSummary>
where
    R: AsyncRead + Unpin,
    F: Future<Output = ()>,
{
    let mut lines = tokio::io::BufReader::new(reader).lines();
    let mut summary = IngestSummary::default();
    let mut header_pending = skip_header;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if header_pending {
                    header_pending = false;
                    continue;
                }
                summary.apply(engine, &line);
            }
            _ = &mut shutdown => {
                info!("Interrupted, stopping ingestion");
                break;
            }
        }
    }
    Ok(summary)
}

/// Long-running mode: flush in the background while reading stdin
pub async fn run(ctx: &CommandContext, skip_header: bool) -> Result<IngestReport> {
    let handle = ctx.coordinator.clone().spawn();

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let summary = ingest_stream(ctx.engine(), tokio::io::stdin(), skip_header, interrupted).await;

    // Always drain, even if reading failed
    let flush = handle.shutdown().await?;
    let summary = summary?;

    Ok(IngestReport {
        summary,
        unique_entities: ctx.engine().count_unique_entities(),
        flushed: flush.written.len(),
        flush_failures: flush.failed.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbstatConfig;
    use probstat_core::EngineConfig;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn create_test_context(temp_dir: &TempDir) -> CommandContext {
        let config = ProbstatConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        CommandContext::open(config).unwrap()
    }

    fn fields(line: &str) -> Option<[String; 3]> {
        parse_row(line).map(|parsed| parsed.map(Cow::into_owned))
    }

    fn row(entity_id: &str, attr1: &str, attr2: &str) -> Option<[String; 3]> {
        Some([entity_id.to_string(), attr1.to_string(), attr2.to_string()])
    }

    #[test]
    fn test_parse_row() {
        assert_eq!(fields("profile1,social,fun_new"), row("profile1", "social", "fun_new"));
        assert_eq!(fields("profile1,social,fun_new\r"), row("profile1", "social", "fun_new"));
        assert_eq!(fields(",,"), row("", "", ""));
        assert_eq!(fields("profile1,social"), None);
        assert_eq!(fields("a,b,c,d"), None);
        assert_eq!(fields(""), None);
    }

    #[test]
    fn test_parse_quoted_row() {
        assert_eq!(fields(r#""p,1",social,"say ""hi""""#), row("p,1", "social", r#"say "hi""#));
        assert_eq!(fields(r#"",","",x"#), row(",", "", "x"));
        assert_eq!(fields(r#"p1,"social,fun"#), None);
        assert_eq!(fields(r#"p1,"social"x,fun"#), None);
        assert_eq!(fields(r#""a,b","c,d""#), None);
    }

    #[test]
    fn test_format_row_reads_back() {
        assert_eq!(format_row(&["p1", "social", "fun_new"]), "p1,social,fun_new");
        assert_eq!(format_row(&["p,1", "", r#"q"t"#]), r#""p,1",,"q""t""#);

        for values in [["p,1", "social", "fun"], ["", r#"a "b", c"#, ","], ["\"", "x", "\"\""]] {
            let line = format_row(&values);
            assert_eq!(fields(&line), row(values[0], values[1], values[2]), "{}", line);
        }
    }

    #[test]
    fn test_ingest_reader_keeps_commas_in_quoted_values() {
        let engine = StatsEngine::new(EngineConfig::default()).unwrap();
        let input = format!("{}\n{}\n", format_row(&["p1", "social,paid", "fun"]), format_row(&["p2", "social,paid", "fun"]));

        let summary = ingest_reader(&engine, Cursor::new(input), false).unwrap();
        assert_eq!(summary, IngestSummary { ingested: 2, skipped: 0 });
        assert_eq!(engine.count("social,paid"), 2);
        assert_eq!(engine.count("social"), 0);
    }

    #[test]
    fn test_ingest_reader_skips_header_and_bad_rows() {
        let engine = StatsEngine::new(EngineConfig::default()).unwrap();
        let input = "pid,utm_medium,utm_source\np1,social,fun_new\nbroken\np2,fb,offer_extra\n";

        let summary = ingest_reader(&engine, Cursor::new(input), true).unwrap();
        assert_eq!(summary, IngestSummary { ingested: 2, skipped: 1 });
        assert_eq!(engine.count("social"), 1);
        assert_eq!(engine.count("pid"), 0);
    }

    #[test]
    fn test_ingest_file_persists() {
        let temp_dir = TempDir::new().unwrap();
        let csv = temp_dir.path().join("events.csv");
        std::fs::write(&csv, "pid,utm_medium,utm_source\np1,social,fun\np2,social,fun\np1,fb,camp\n").unwrap();

        let report = {
            let ctx = create_test_context(&temp_dir);
            ingest_file(&ctx, &csv).unwrap()
        };
        assert_eq!(report.summary.ingested, 3);
        assert_eq!(report.unique_entities, 2);
        assert_eq!(report.flush_failures, 0);

        let reopened = create_test_context(&temp_dir);
        assert_eq!(reopened.engine().count("social"), 2);
        assert_eq!(reopened.engine().count("p1:fb:camp"), 1);
    }

    #[tokio::test]
    async fn test_ingest_stream_until_eof() {
        let engine = StatsEngine::new(EngineConfig::default()).unwrap();
        let input: &[u8] = b"p1,social,fun\np2,fb,fun\nnot-a-row\n";

        let summary = ingest_stream(&engine, input, false, std::future::pending()).await.unwrap();
        assert_eq!(summary, IngestSummary { ingested: 2, skipped: 1 });
        assert_eq!(engine.count("fun"), 2);
    }

    #[tokio::test]
    async fn test_ingest_stream_stops_on_shutdown() {
        let engine = StatsEngine::new(EngineConfig::default()).unwrap();
        let (_writer, reader) = tokio::io::duplex(64);

        let summary = ingest_stream(&engine, reader, false, async {}).await.unwrap();
        assert_eq!(summary, IngestSummary::default());
    }
}
