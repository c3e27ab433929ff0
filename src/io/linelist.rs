use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

// Transmission linelist: one whitespace-separated row per case,
//   id  infector  infection_time  sampling_time  [kind]
// with '.' marking a missing infector (an introduction) or an unobserved
// sampling time. '#' starts a comment.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub id: String,
    pub infector: Option<String>,
    pub infection_time: f64,
    pub sampling_time: Option<f64>,
    pub kind: Option<String>,
}

fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("failed to open {path:?}"))?;
    let reader: Box<dyn Read> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

fn parse_optional(field: &str) -> Option<&str> {
    if field == "." { None } else { Some(field) }
}

pub fn read_linelist(path: &Path) -> Result<Vec<CaseRecord>> {
    let mut reader = open_reader(path)?;
    let mut line = String::new();
    let mut row_no = 0usize;
    let mut records = Vec::new();

    loop {
        line.clear();
        let bytes = reader
            .read_line(&mut line)
            .with_context(|| format!("failed to read {path:?}"))?;
        if bytes == 0 {
            break;
        }
        row_no += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut cols = trimmed.split_whitespace();
        let id = cols
            .next()
            .with_context(|| format!("invalid linelist row {row_no}: missing id"))?
            .to_string();
        let infector = cols
            .next()
            .with_context(|| format!("invalid linelist row {row_no}: missing infector"))?;
        let infection_str = cols
            .next()
            .with_context(|| format!("invalid linelist row {row_no}: missing infection time"))?;
        let sampling_str = cols
            .next()
            .with_context(|| format!("invalid linelist row {row_no}: missing sampling time"))?;
        let kind = cols.next().map(str::to_string);
        if cols.next().is_some() {
            bail!("invalid linelist row {row_no}: trailing fields");
        }

        let infection_time: f64 = infection_str
            .parse()
            .with_context(|| format!("invalid linelist row {row_no}: bad infection time '{infection_str}'"))?;
        if !infection_time.is_finite() {
            bail!("invalid linelist row {row_no}: infection time must be finite");
        }
        let sampling_time = match parse_optional(sampling_str) {
            None => None,
            Some(s) => {
                let t: f64 = s.parse().with_context(|| {
                    format!("invalid linelist row {row_no}: bad sampling time '{s}'")
                })?;
                if !t.is_finite() {
                    bail!("invalid linelist row {row_no}: sampling time must be finite");
                }
                if t <= infection_time {
                    bail!(
                        "invalid linelist row {row_no}: case '{id}' sampled at {t} but infected at {infection_time}"
                    );
                }
                Some(t)
            }
        };

        records.push(CaseRecord {
            id,
            infector: parse_optional(infector).map(str::to_string),
            infection_time,
            sampling_time,
            kind,
        });
    }

    if records.is_empty() {
        bail!("no cases found in linelist {path:?}");
    }
    Ok(records)
}
