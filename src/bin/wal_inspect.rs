use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use numstore::wal::record::WalRecord;
use numstore::wal::Wal;

const EXIT_OK: i32 = 0;
const EXIT_OPEN_FAILED: i32 = 20;

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormatArg {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "numstore-wal-inspect", about = "Dump WAL records for a numstore database")]
struct Cli {
    /// Directory holding the WAL segment files
    wal_dir: PathBuf,

    /// Base name shared by the WAL segment files
    #[arg(long, default_value = "wal")]
    base: String,

    /// Only dump records at or after this LSN
    #[arg(long, default_value_t = 0)]
    from: u64,

    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormatArg,
}

fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out
}

fn describe(lsn: u64, rec: &WalRecord) -> String {
    match rec {
        WalRecord::Begin { tid } => format!("lsn={lsn} BEGIN tid={tid}"),
        WalRecord::Update { tid, prev_lsn, pgno, .. } => {
            format!("lsn={lsn} UPDATE tid={tid} prev_lsn={prev_lsn} pgno={pgno}")
        }
        WalRecord::Clr {
            tid,
            prev_lsn,
            pgno,
            undo_next,
            ..
        } => format!("lsn={lsn} CLR tid={tid} prev_lsn={prev_lsn} pgno={pgno} undo_next={undo_next}"),
        WalRecord::Commit { tid, prev_lsn } => format!("lsn={lsn} COMMIT tid={tid} prev_lsn={prev_lsn}"),
        WalRecord::End { tid, prev_lsn } => format!("lsn={lsn} END tid={tid} prev_lsn={prev_lsn}"),
        WalRecord::CkptBegin => format!("lsn={lsn} CKPT_BEGIN"),
        WalRecord::CkptEnd { att, dpt } => {
            format!("lsn={lsn} CKPT_END att_entries={} dpt_entries={}", att.len(), dpt.len())
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let wal = Wal::open(&cli.wal_dir, &cli.base).unwrap_or_else(|e| {
        eprintln!("ERROR: failed to open WAL at {}: {e}", cli.wal_dir.display());
        process::exit(EXIT_OPEN_FAILED);
    });

    let entries = wal.iter_from(cli.from).unwrap_or_else(|e| {
        eprintln!("ERROR: failed to read WAL records: {e}");
        process::exit(EXIT_OPEN_FAILED);
    });

    match cli.format {
        OutputFormatArg::Text => {
            println!("{} WAL record(s) from lsn {}", entries.len(), cli.from);
            for (lsn, rec) in &entries {
                println!("  {}", describe(*lsn, rec));
            }
        }
        OutputFormatArg::Json => {
            let records = entries
                .iter()
                .map(|(lsn, rec)| format!("\"{}\"", json_escape(&describe(*lsn, rec))))
                .collect::<Vec<_>>()
                .join(",");
            println!(
                "{{\"from\":{},\"count\":{},\"records\":[{}]}}",
                cli.from,
                entries.len(),
                records
            );
        }
    }

    process::exit(EXIT_OK);
}
