/// Appends one freshly observed entry to an optional prior series and
/// returns the grown series. Entries are never reordered, deduplicated or
/// truncated; the caller is responsible for handing in a timestamp larger
/// than the last entry's.
pub fn append<T>(prior: Option<Vec<T>>, entry: T) -> Vec<T> {
    let mut series = prior.unwrap_or_default();
    series.push(entry);
    series
}
