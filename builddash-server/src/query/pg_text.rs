//! Text renderings for PostgreSQL values that have no native JSON shape
//!
//! Results arrive in binary format. These decoders read that format and
//! print the value the way `psql` would, so nothing is rounded or dropped.

use std::fmt::Write as _;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use sqlx::error::BoxDynError;
use sqlx::postgres::types::{PgInterval, PgMoney};
use sqlx::postgres::{PgValueFormat, PgValueRef};
use sqlx::{Decode, Postgres};

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

/// `NUMERIC` at full precision, including `NaN` and the infinities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericText(pub String);

impl<'r> Decode<'r, Postgres> for NumericText {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(Self(value.as_str()?.to_owned())),
            PgValueFormat::Binary => numeric_from_binary(value.as_bytes()?).map(Self),
        }
    }
}

/// `INET` / `CIDR` as `address/bits`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InetText(pub String);

impl<'r> Decode<'r, Postgres> for InetText {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(Self(value.as_str()?.to_owned())),
            PgValueFormat::Binary => inet_from_binary(value.as_bytes()?).map(Self),
        }
    }
}

/// Enum labels travel as their UTF-8 text in either format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelText(pub String);

impl<'r> Decode<'r, Postgres> for LabelText {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        Ok(Self(value.as_str()?.to_owned()))
    }
}

fn be_u16(buf: &[u8], word: usize) -> Result<u16, BoxDynError> {
    buf.get(word * 2..word * 2 + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "truncated NUMERIC value".into())
}

fn numeric_from_binary(buf: &[u8]) -> Result<String, BoxDynError> {
    let ndigits = usize::from(be_u16(buf, 0)?);
    let weight = be_u16(buf, 1)? as i16;
    let sign = be_u16(buf, 2)?;
    let dscale = be_u16(buf, 3)?;
    let digits = (0..ndigits)
        .map(|d| be_u16(buf, 4 + d))
        .collect::<Result<Vec<_>, _>>()?;

    match sign {
        NUMERIC_NAN => Ok("NaN".to_owned()),
        NUMERIC_PINF => Ok("Infinity".to_owned()),
        NUMERIC_NINF => Ok("-Infinity".to_owned()),
        NUMERIC_POS | NUMERIC_NEG => Ok(format_numeric(sign == NUMERIC_NEG, weight, dscale, &digits)),
        other => Err(format!("invalid NUMERIC sign 0x{other:04X}").into()),
    }
}

/// Render base-10000 digit groups; `weight` is the exponent of the first group.
pub fn format_numeric(negative: bool, weight: i16, dscale: u16, digits: &[u16]) -> String {
    let mut out = String::new();
    if negative && !digits.iter().all(|&d| d == 0) {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for idx in 0..=weight as usize {
            let group = digits.get(idx).copied().unwrap_or(0);
            if idx == 0 {
                let _ = write!(out, "{group}");
            } else {
                let _ = write!(out, "{group:04}");
            }
        }
    }

    if dscale > 0 {
        let dscale = usize::from(dscale);
        let mut frac = String::with_capacity(dscale + 4);
        let mut idx = i32::from(weight) + 1;
        while frac.len() < dscale {
            let group = usize::try_from(idx)
                .ok()
                .and_then(|i| digits.get(i).copied())
                .unwrap_or(0);
            let _ = write!(frac, "{group:04}");
            idx += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }

    out
}

fn inet_from_binary(buf: &[u8]) -> Result<String, BoxDynError> {
    let [family, bits, is_cidr, len, addr @ ..] = buf else {
        return Err("truncated INET value".into());
    };

    let (ip, max_bits): (IpAddr, u8) = match (*family, addr.len()) {
        (PGSQL_AF_INET, 4) if *len == 4 => {
            (Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3]).into(), 32)
        }
        (PGSQL_AF_INET6, 16) if *len == 16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(addr);
            (Ipv6Addr::from(octets).into(), 128)
        }
        _ => return Err("invalid INET value".into()),
    };

    // inet hides a full-length mask, cidr always shows it
    if *is_cidr == 0 && *bits == max_bits {
        Ok(ip.to_string())
    } else {
        Ok(format!("{ip}/{bits}"))
    }
}

/// `INTERVAL` in PostgreSQL's default output style, e.g. `1 mon 2 days 03:04:05.5`.
pub fn interval_text(interval: &PgInterval) -> String {
    let mut parts = Vec::new();
    let years = interval.months / 12;
    let months = interval.months % 12;

    for (n, unit) in [(years, "year"), (months, "mon"), (interval.days, "day")] {
        if n != 0 {
            parts.push(format!("{n} {unit}{}", if n == 1 { "" } else { "s" }));
        }
    }

    if interval.microseconds != 0 || parts.is_empty() {
        let micros = interval.microseconds.unsigned_abs();
        let mut clock = format!(
            "{}{:02}:{:02}:{:02}",
            if interval.microseconds < 0 { "-" } else { "" },
            micros / 3_600_000_000,
            micros / 60_000_000 % 60,
            micros / 1_000_000 % 60
        );
        let fraction = micros % 1_000_000;
        if fraction != 0 {
            let digits = format!("{fraction:06}");
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }

    parts.join(" ")
}

/// `MONEY` as a plain decimal with two fraction digits; currency symbols are locale output.
pub fn money_text(money: &PgMoney) -> String {
    let cents = money.0.unsigned_abs();
    format!(
        "{}{}.{:02}",
        if money.0 < 0 { "-" } else { "" },
        cents / 100,
        cents % 100
    )
}
