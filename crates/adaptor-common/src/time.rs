//! Date handling for request date lists.

use chrono::NaiveDate;

use crate::error::{RequestError, RequestResult};

/// Most days a date list may expand to.
pub const MAX_EXPANDED_DATES: u64 = 100_000;

/// Parse a single date given as `YYYY-MM-DD` or `YYYYMMDD`.
pub fn parse_date(s: &str) -> RequestResult<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .map_err(|_| RequestError::InvalidDate(s.to_string()))
}

/// Inclusive day ranges of a date list, sorted and merged.
fn date_ranges<S: AsRef<str>>(values: &[S]) -> RequestResult<Vec<(NaiveDate, NaiveDate)>> {
    let mut ranges = Vec::with_capacity(values.len());

    for value in values {
        let value = value.as_ref();
        let parts: Vec<&str> = value.split('/').collect();
        match parts.as_slice() {
            [single] => {
                let day = parse_date(single)?;
                ranges.push((day, day));
            }
            [start, end] | [start, "to", end] => {
                let start = parse_date(start)?;
                let end = parse_date(end)?;
                if start > end {
                    return Err(RequestError::InvalidDate(value.to_string()));
                }
                ranges.push((start, end));
            }
            _ => return Err(RequestError::InvalidDate(value.to_string())),
        }
    }

    ranges.sort();
    let mut merged: Vec<(NaiveDate, NaiveDate)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            // Adjacent or overlapping: extend the previous range.
            Some((_, last)) if last.succ_opt().map_or(true, |next| start <= next) => {
                *last = (*last).max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    Ok(merged)
}

/// Number of distinct days a date list addresses, without expanding it.
pub fn count_dates<S: AsRef<str>>(values: &[S]) -> RequestResult<u64> {
    Ok(date_ranges(values)?
        .iter()
        .map(|(start, end)| (*end - *start).num_days() as u64 + 1)
        .sum())
}

/// Expand a date list into individual days.
///
/// Each entry is either a single date or an inclusive range written
/// `START/END` (or `START/to/END`). The result is sorted and free of
/// duplicates. Lists covering more than [`MAX_EXPANDED_DATES`] days are
/// rejected before anything is expanded.
pub fn expand_dates<S: AsRef<str>>(values: &[S]) -> RequestResult<Vec<NaiveDate>> {
    let ranges = date_ranges(values)?;
    let total: u64 = ranges
        .iter()
        .map(|(start, end)| (*end - *start).num_days() as u64 + 1)
        .sum();
    if total > MAX_EXPANDED_DATES {
        return Err(RequestError::TooManyDates {
            count: total,
            limit: MAX_EXPANDED_DATES,
        });
    }

    let mut dates = Vec::with_capacity(total as usize);
    for (start, end) in ranges {
        let mut day = start;
        loop {
            dates.push(day);
            if day == end {
                break;
            }
            day = day
                .succ_opt()
                .ok_or_else(|| RequestError::InvalidDate(day.to_string()))?;
        }
    }
    Ok(dates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2024-03-01").unwrap(), d(2024, 3, 1));
        assert_eq!(parse_date("20240301").unwrap(), d(2024, 3, 1));
        assert!(parse_date("2024-13-01").is_err());
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_expand_range() {
        let dates = expand_dates(&["2024-02-28/2024-03-01"]).unwrap();
        assert_eq!(dates, vec![d(2024, 2, 28), d(2024, 2, 29), d(2024, 3, 1)]);

        let dates = expand_dates(&["20240101/to/20240102"]).unwrap();
        assert_eq!(dates.len(), 2);
    }

    #[test]
    fn test_expand_sorts_and_dedups() {
        let dates = expand_dates(&["2024-01-03", "2024-01-01/2024-01-03"]).unwrap();
        assert_eq!(dates, vec![d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 3)]);

        let dates = expand_dates(&["2024-01-05", "2024-01-01/2024-01-02", "2024-01-03"]).unwrap();
        assert_eq!(dates.len(), 4);
    }

    #[test]
    fn test_reversed_range_rejected() {
        assert_eq!(
            expand_dates(&["2024-01-05/2024-01-01"]),
            Err(RequestError::InvalidDate("2024-01-05/2024-01-01".to_string()))
        );
    }

    #[test]
    fn test_last_representable_day() {
        let last = NaiveDate::MAX.format("%Y-%m-%d").to_string();
        let range = format!("{}/{}", last, last);
        assert_eq!(expand_dates(&[range.as_str()]).unwrap(), vec![NaiveDate::MAX]);
        assert_eq!(count_dates(&[range.as_str(), last.as_str()]).unwrap(), 1);
    }

    #[test]
    fn test_huge_range_counted_not_expanded() {
        let range = ["1900-01-01/2399-12-31"];
        let days = count_dates(&range).unwrap();
        assert!(days > MAX_EXPANDED_DATES);
        assert_eq!(
            expand_dates(&range),
            Err(RequestError::TooManyDates {
                count: days,
                limit: MAX_EXPANDED_DATES
            })
        );
    }

    #[test]
    fn test_count_merges_overlaps() {
        assert_eq!(
            count_dates(&["2024-01-01/2024-01-10", "2024-01-05/2024-01-12", "2024-01-13"]).unwrap(),
            13
        );
    }
}
