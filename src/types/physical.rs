//! Physical and calendar constants shared across the model.

/// Seconds per year used for every "year" conversion in the model.
pub const SECONDS_PER_YEAR: f64 = 3.15569259747e7;

pub const SECONDS_PER_DAY: f64 = 86400.0;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_year_is_mean_gregorian_year() {
        assert_relative_eq!(SECONDS_PER_YEAR / SECONDS_PER_DAY, 365.2422, max_relative = 1e-6);
    }
}
