use std::{io::Write, time::Duration};

use console::{style, Emoji, StyledObject};

use crate::{aggregate::Summary, sample::StatusCode};

pub const SUMMARY_EMOJI: Emoji<'_, '_> = Emoji("💥", "");

pub fn console<W: Write>(summary: &Summary, elapsed: Duration, percentile: &[f64], w: &mut W) -> std::io::Result<()> {
    writeln!(w, "{} summary of all shots {}", SUMMARY_EMOJI, SUMMARY_EMOJI)?;

    write!(w, "  status:")?;
    for (status, count) in &summary.statuses {
        write!(w, " {}={}", styled(*status), count)?;
    }
    let rps = summary.count as f64 / elapsed.as_secs_f64();
    writeln!(w, "    rps: {}req/{:.2?}={:.2}req/s", summary.count, elapsed, rps)?;

    write!(w, "  latency: min={:.3?} mean={:.3?} ", summary.min, summary.mean)?;
    for (p, (_, q)) in percentile.iter().zip(&summary.quantile) {
        write!(w, "p{}={:.3?} ", p, q)?;
    }
    writeln!(w, "max={:.3?}", summary.max)
}

fn styled(status: StatusCode) -> StyledObject<u16> {
    match status {
        StatusCode::Ok => style(status.code()).green(),
        StatusCode::BadRequest => style(status.code()).yellow(),
        StatusCode::Unset => style(status.code()).red(),
    }
}
