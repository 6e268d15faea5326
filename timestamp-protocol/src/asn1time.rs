// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ASN.1 primitives related to time types.

use {
    bcder::{
        decode::{Constructed, DecodeError, Primitive, Source},
        encode::{PrimitiveContent, Values},
        Mode, Tag,
    },
    chrono::{Datelike, TimeZone, Timelike},
    std::{
        fmt::{Display, Formatter},
        io::Write,
        ops::Deref,
        str::FromStr,
    },
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Time {
    UtcTime(UtcTime),
    GeneralTime(GeneralizedTime),
}

impl Time {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive(|tag, prim| match tag {
            Tag::UTC_TIME => Ok(Self::UtcTime(UtcTime::from_primitive(prim)?)),
            Tag::GENERALIZED_TIME => Ok(Self::GeneralTime(GeneralizedTime::from_primitive(prim)?)),
            _ => Err(prim.content_err("expected UTCTime or GeneralizedTime")),
        })
    }

    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_primitive(|tag, prim| match tag {
            Tag::UTC_TIME => Ok(Self::UtcTime(UtcTime::from_primitive(prim)?)),
            Tag::GENERALIZED_TIME => Ok(Self::GeneralTime(GeneralizedTime::from_primitive(prim)?)),
            _ => Err(prim.content_err("expected UTCTime or GeneralizedTime")),
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        match self {
            Self::UtcTime(utc) => (Some(utc.encode()), None),
            Self::GeneralTime(gt) => (None, Some(gt.encode())),
        }
    }
}

impl From<Time> for chrono::DateTime<chrono::Utc> {
    fn from(t: Time) -> Self {
        match t {
            Time::UtcTime(utc) => *utc,
            Time::GeneralTime(gt) => gt.into(),
        }
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Time {
    fn from(t: chrono::DateTime<chrono::Utc>) -> Self {
        Self::UtcTime(UtcTime(t))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Zone {
    Utc,
    Offset(chrono::FixedOffset),
}

impl Display for Zone {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Utc => f.write_str("Z"),
            Self::Offset(offset) => f.write_str(format!("{}", offset).replace(':', "").as_str()),
        }
    }
}

/// A GeneralizedTime value.
///
/// Time-Stamping Authorities commonly emit `genTime` values with
/// fractional seconds and occasionally with an explicit UTC offset, so
/// parsing accepts `YYYYMMDDHHMMSS[.f+](Z|±HHMM)`. Fractions are
/// truncated to millisecond precision. Serialization always emits the
/// second-granular form.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneralizedTime {
    time: chrono::NaiveDateTime,
    timezone: Zone,
}

impl GeneralizedTime {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive_if(Tag::GENERALIZED_TIME, |prim| Self::from_primitive(prim))
    }

    pub fn from_primitive<S: Source>(
        prim: &mut Primitive<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let data = prim.take_all()?;

        Self::parse(data.as_ref()).map_err(|e| prim.content_err(e))
    }

    /// Parse GeneralizedTime string data.
    pub fn parse(data: &[u8]) -> Result<Self, &'static str> {
        const DATE_TIME_LEN: usize = "YYYYMMDDHHMMSS".len();

        if data.len() <= DATE_TIME_LEN {
            return Err("GeneralizedTime too short");
        }

        let field = |range: std::ops::Range<usize>| -> Result<u32, &'static str> {
            u32::from_str(
                std::str::from_utf8(&data[range]).map_err(|_| "non-ASCII in GeneralizedTime")?,
            )
            .map_err(|_| "non-digit in GeneralizedTime")
        };

        let year = field(0..4)? as i32;
        let month = field(4..6)?;
        let day = field(6..8)?;
        let hour = field(8..10)?;
        let minute = field(10..12)?;
        let second = field(12..14)?;

        let mut rest = &data[DATE_TIME_LEN..];

        let mut millis = 0u32;
        if rest.first() == Some(&b'.') {
            let digits = rest[1..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count();
            if digits == 0 {
                return Err("empty fraction in GeneralizedTime");
            }

            let mut value = 0u32;
            for (i, b) in rest[1..1 + digits].iter().enumerate() {
                if i < 3 {
                    value = value * 10 + u32::from(b - b'0');
                }
            }
            // Scale partial fractions to milliseconds.
            for _ in digits..3 {
                value *= 10;
            }
            millis = value.min(999);

            rest = &rest[1 + digits..];
        }

        let timezone = match rest {
            [b'Z'] => Zone::Utc,
            [sign @ (b'+' | b'-'), h1, h2, m1, m2] => {
                let all_digits = [h1, h2, m1, m2].iter().all(|b| b.is_ascii_digit());
                if !all_digits {
                    return Err("malformed offset in GeneralizedTime");
                }

                let hours = i32::from(h1 - b'0') * 10 + i32::from(h2 - b'0');
                let minutes = i32::from(m1 - b'0') * 10 + i32::from(m2 - b'0');
                let seconds = (hours * 60 + minutes) * 60;

                let offset = if *sign == b'+' {
                    chrono::FixedOffset::east_opt(seconds)
                } else {
                    chrono::FixedOffset::west_opt(seconds)
                }
                .ok_or("offset out of range in GeneralizedTime")?;

                Zone::Offset(offset)
            }
            _ => return Err("malformed zone designator in GeneralizedTime"),
        };

        let time = chrono::NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_milli_opt(hour, minute, second, millis))
            .ok_or("date out of range in GeneralizedTime")?;

        Ok(Self { time, timezone })
    }
}

impl Display for GeneralizedTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}{:02}{:02}{:02}{:02}{:02}{}",
            self.time.year(),
            self.time.month(),
            self.time.day(),
            self.time.hour(),
            self.time.minute(),
            self.time.second(),
            self.timezone,
        )
    }
}

impl From<GeneralizedTime> for chrono::DateTime<chrono::Utc> {
    fn from(gt: GeneralizedTime) -> Self {
        match gt.timezone {
            Zone::Utc => chrono::Utc.from_utc_datetime(&gt.time),
            Zone::Offset(offset) => match offset.from_local_datetime(&gt.time) {
                chrono::LocalResult::Single(dt) => dt.with_timezone(&chrono::Utc),
                // Fixed offsets never produce ambiguous local times.
                _ => chrono::Utc.from_utc_datetime(&gt.time),
            },
        }
    }
}

impl PrimitiveContent for GeneralizedTime {
    const TAG: Tag = Tag::GENERALIZED_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        self.to_string().len()
    }

    fn write_encoded<W: Write>(&self, _: Mode, target: &mut W) -> Result<(), std::io::Error> {
        target.write_all(self.to_string().as_bytes())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UtcTime(chrono::DateTime<chrono::Utc>);

impl UtcTime {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive_if(Tag::UTC_TIME, |prim| Self::from_primitive(prim))
    }

    pub fn from_primitive<S: Source>(
        prim: &mut Primitive<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let data = prim.take_all()?;

        Self::parse(data.as_ref()).map_err(|e| prim.content_err(e))
    }

    fn parse(data: &[u8]) -> Result<Self, &'static str> {
        if data.len() != "YYMMDDHHMMSSZ".len() {
            return Err("unexpected UTCTime length");
        }

        let field = |range: std::ops::Range<usize>| -> Result<u32, &'static str> {
            u32::from_str(std::str::from_utf8(&data[range]).map_err(|_| "non-ASCII in UTCTime")?)
                .map_err(|_| "non-digit in UTCTime")
        };

        let year = field(0..2)? as i32;
        let year = if year >= 50 { year + 1900 } else { year + 2000 };

        let month = field(2..4)?;
        let day = field(4..6)?;
        let hour = field(6..8)?;
        let minute = field(8..10)?;
        let second = field(10..12)?;

        if data[12] != b'Z' {
            return Err("UTCTime must end in Z");
        }

        let time = chrono::NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, second))
            .ok_or("date out of range in UTCTime")?;

        Ok(Self(chrono::Utc.from_utc_datetime(&time)))
    }
}

impl Display for UtcTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}{:02}{:02}{:02}{:02}{:02}Z",
            self.0.year() % 100,
            self.0.month(),
            self.0.day(),
            self.0.hour(),
            self.0.minute(),
            self.0.second()
        )
    }
}

impl Deref for UtcTime {
    type Target = chrono::DateTime<chrono::Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PrimitiveContent for UtcTime {
    const TAG: Tag = Tag::UTC_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        self.to_string().len()
    }

    fn write_encoded<W: Write>(&self, _: Mode, target: &mut W) -> Result<(), std::io::Error> {
        target.write_all(self.to_string().as_bytes())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generalized_time_plain() {
        let gt = GeneralizedTime::parse(b"20220129133742Z").unwrap();
        assert_eq!(gt.time.year(), 2022);
        assert_eq!(gt.time.month(), 1);
        assert_eq!(gt.time.day(), 29);
        assert_eq!(gt.time.hour(), 13);
        assert_eq!(gt.time.minute(), 37);
        assert_eq!(gt.time.second(), 42);
        assert_eq!(gt.to_string(), "20220129133742Z");
    }

    #[test]
    fn generalized_time_fractional() {
        let gt = GeneralizedTime::parse(b"20220129133742.333Z").unwrap();
        assert_eq!(gt.time.nanosecond(), 333_000_000);

        // Digits beyond millisecond precision are ignored.
        let gt = GeneralizedTime::parse(b"20220129133742.1234567Z").unwrap();
        assert_eq!(gt.time.nanosecond(), 123_000_000);

        // Short fractions scale up.
        let gt = GeneralizedTime::parse(b"20220129133742.5Z").unwrap();
        assert_eq!(gt.time.nanosecond(), 500_000_000);
    }

    #[test]
    fn generalized_time_offset() {
        let gt = GeneralizedTime::parse(b"20220130024612+0100").unwrap();
        let utc = chrono::DateTime::<chrono::Utc>::from(gt);
        assert_eq!(utc.hour(), 1);
        assert_eq!(utc.minute(), 46);

        let gt = GeneralizedTime::parse(b"20220130024612-0200").unwrap();
        let utc = chrono::DateTime::<chrono::Utc>::from(gt);
        assert_eq!(utc.hour(), 4);
    }

    #[test]
    fn generalized_time_invalid() {
        assert!(GeneralizedTime::parse(b"").is_err());
        assert!(GeneralizedTime::parse(b"abcd").is_err());
        assert!(GeneralizedTime::parse(b"20220130123015").is_err());
        assert!(GeneralizedTime::parse(b"20220130123015a").is_err());
        assert!(GeneralizedTime::parse(b"20220130123015.Z").is_err());
        assert!(GeneralizedTime::parse(b"20220130123015+01").is_err());
        assert!(GeneralizedTime::parse(b"20220130123015+01000").is_err());
        assert!(GeneralizedTime::parse(b"20220130123015+0a00").is_err());
        assert!(GeneralizedTime::parse(b"20221330123015Z").is_err());
    }

    #[test]
    fn utc_time() {
        let t = UtcTime::parse(b"220129133742Z").unwrap();
        assert_eq!(t.0.year(), 2022);
        assert_eq!(t.to_string(), "220129133742Z");

        let t = UtcTime::parse(b"990129133742Z").unwrap();
        assert_eq!(t.0.year(), 1999);

        assert!(UtcTime::parse(b"2201291337Z").is_err());
        assert!(UtcTime::parse(b"220129133742X").is_err());
    }
}
