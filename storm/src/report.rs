use crate::runner::RunSummary;
use crate::trial::TrialResult;
use human_repr::{HumanCount, HumanDuration};
use std::io::{self, Write};

pub fn print_banner(count: u32, addresses: usize) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(
        out,
        "Sending initial packets: {count} trial(s) against {addresses} address(es)"
    )
}

pub fn print_trial(result: &TrialResult, quiet: bool) -> io::Result<()> {
    let mut out = io::stdout().lock();
    write_trial(&mut out, result, quiet)?;
    out.flush()
}

pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
    let mut out = io::stdout().lock();
    write_summary(&mut out, summary)?;
    out.flush()
}

pub fn write_trial<W: Write>(out: &mut W, result: &TrialResult, quiet: bool) -> io::Result<()> {
    let id = result.trial_id;
    for outcome in &result.outcomes {
        match &outcome.result {
            Ok(delivery) if quiet || delivery.body.is_none() => writeln!(
                out,
                "[trial {id}] {} -> {}, Response Body: {} bytes",
                outcome.address, delivery.status, delivery.bytes
            )?,
            Ok(delivery) => {
                writeln!(
                    out,
                    "[trial {id}] {} -> {}, Response Body:",
                    outcome.address, delivery.status
                )?;
                if let Some(body) = &delivery.body {
                    writeln!(out, "{}", String::from_utf8_lossy(body))?;
                }
            }
            Err(error) => writeln!(
                out,
                "[trial {id}] {} -> failed ({}): {error}",
                outcome.address,
                error.as_code()
            )?,
        }
    }

    writeln!(
        out,
        "[trial {id}] completed: {} succeeded, {} failed, {} received in {}",
        result.successes(),
        result.failures(),
        result.received_bytes().human_count_bytes(),
        result.elapsed.human_duration()
    )
}

pub fn write_summary<W: Write>(out: &mut W, summary: &RunSummary) -> io::Result<()> {
    writeln!(
        out,
        "Run finished: {}/{} trial(s) completed, {} request(s) succeeded, {} failed in {}",
        summary.completed,
        summary.launched,
        summary.successes(),
        summary.failures(),
        summary.elapsed.human_duration()
    )
}
