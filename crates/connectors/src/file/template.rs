//! Date placeholders in file paths, e.g. `trades/trade_{date,yyyyMMdd}.csv`.
//!
//! A placeholder is `{name,pattern}`. `pattern` understands the tokens
//! `yyyy yy MM dd HH mm ss SSS`; anything else is copied literally.

use chrono::{DateTime, NaiveDate, Utc};
use model::{core::value::Value, error::BatchError, execution::params::JobParameters};

/// Renders every placeholder of `template` against `reference`.
pub fn resolve_template(template: &str, reference: DateTime<Utc>) -> Result<String, BatchError> {
    render(template, |_| Ok(reference))
}

/// Renders `template`, taking each placeholder's reference time from the job
/// parameter of the same name, or `start_time` if there is none.
///
/// String parameters are read as `yyyy-MM-dd` or RFC 3339.
pub fn resolve_path(
    template: &str,
    params: &JobParameters,
    start_time: DateTime<Utc>,
) -> Result<String, BatchError> {
    render(template, |name| match params.get(name) {
        None | Some(Value::Null) => Ok(start_time),
        Some(Value::Timestamp(ts)) => Ok(*ts),
        Some(Value::String(raw)) => parse_reference(name, raw),
        Some(other) => Err(BatchError::configuration(format!(
            "parameter '{name}' ({other}) cannot be used as a date"
        ))),
    })
}

fn parse_reference(name: &str, raw: &str) -> Result<DateTime<Utc>, BatchError> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| {
            BatchError::configuration(format!(
                "parameter '{name}' = '{raw}' is neither yyyy-MM-dd nor RFC 3339"
            ))
        })
}

fn render<F>(template: &str, mut reference_for: F) -> Result<String, BatchError>
where
    F: FnMut(&str) -> Result<DateTime<Utc>, BatchError>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            BatchError::configuration(format!("unclosed placeholder in '{template}'"))
        })?;

        let (name, pattern) = after[..close]
            .split_once(',')
            .map(|(n, p)| (n.trim(), p.trim()))
            .filter(|(n, p)| !n.is_empty() && !p.is_empty())
            .ok_or_else(|| {
                BatchError::configuration(format!(
                    "placeholder '{{{}}}' in '{template}' must look like {{name,pattern}}",
                    &after[..close]
                ))
            })?;

        let reference = reference_for(name)?;
        out.push_str(&reference.format(&to_strftime(pattern)).to_string());
        rest = &after[close + 1..];
    }

    if rest.contains('}') {
        return Err(BatchError::configuration(format!(
            "unbalanced '}}' in '{template}'"
        )));
    }
    out.push_str(rest);
    Ok(out)
}

fn to_strftime(pattern: &str) -> String {
    const TOKENS: [(&str, &str); 8] = [
        ("yyyy", "%Y"),
        ("SSS", "%3f"),
        ("yy", "%y"),
        ("MM", "%m"),
        ("dd", "%d"),
        ("HH", "%H"),
        ("mm", "%M"),
        ("ss", "%S"),
    ];

    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    'outer: while !rest.is_empty() {
        for (token, spec) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = tail;
                continue 'outer;
            }
        }

        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
        }
        rest = chars.as_str();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use model::error::ErrorCode;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap()
    }

    #[test]
    fn renders_date_tokens() {
        assert_eq!(
            resolve_template("trades/trade_{date,yyyyMMdd}.csv", reference()).unwrap(),
            "trades/trade_20240307.csv"
        );
        assert_eq!(
            resolve_template("{ts,yy-MM-dd HH:mm:ss.SSS}", reference()).unwrap(),
            "24-03-07 09:05:02.000"
        );
        assert_eq!(
            resolve_template("plain/path.csv", reference()).unwrap(),
            "plain/path.csv"
        );
    }

    #[test]
    fn parameters_override_start_time() {
        let params = JobParameters::new().with("date", "2023-12-31");
        assert_eq!(
            resolve_path("out_{date,yyyyMMdd}.csv", &params, reference()).unwrap(),
            "out_20231231.csv"
        );
        assert_eq!(
            resolve_path("out_{run,yyyyMMdd}.csv", &params, reference()).unwrap(),
            "out_20240307.csv"
        );

        let rfc = JobParameters::new().with("date", "2022-01-02T03:04:05Z");
        assert_eq!(
            resolve_path("{date,yyyy/MM/dd}", &rfc, reference()).unwrap(),
            "2022/01/02"
        );
    }

    #[test]
    fn malformed_placeholders_are_configuration_errors() {
        for bad in ["a_{date}.csv", "a_{date,yyyy.csv", "a_{,yyyy}.csv", "a}.csv"] {
            let err = resolve_template(bad, reference()).unwrap_err();
            assert_eq!(err.code(), ErrorCode::Configuration, "{bad}");
        }

        let params = JobParameters::new().with("date", "yesterday");
        let err = resolve_path("{date,yyyy}", &params, reference()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Configuration);
    }
}
