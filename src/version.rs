//! Crate version helpers.
//!
//! Components negotiating with external software compare against a semver
//! triple. Comparison strings accept both `"M.m.p"` and `"vM.m.p"`.

use crate::error::{Error, Result};

/// Major version component.
pub const MAJOR: u32 = 0;
/// Minor version component.
pub const MINOR: u32 = 3;
/// Maintenance version component.
pub const MAINT: u32 = 1;

/// Current version as a `"M.m.p"` string.
pub fn current() -> String {
    format!("{}.{}.{}", MAJOR, MINOR, MAINT)
}

/// Parse a `"M.m.p"` or `"vM.m.p"` string into a triple.
fn extract(compare: &str) -> Result<(u32, u32, u32)> {
    let trimmed = compare.strip_prefix('v').unwrap_or(compare);
    let mut parts = trimmed.split('.');

    let mut next = |name: &str| -> Result<u32> {
        parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(|| {
                Error::general(
                    "version::extract",
                    format!("invalid {} component in version string '{}'", name, compare),
                )
            })
    };

    let major = next("major")?;
    let minor = next("minor")?;
    let maint = next("maint")?;

    if parts.next().is_some() {
        return Err(Error::general(
            "version::extract",
            format!("trailing components in version string '{}'", compare),
        ));
    }

    Ok((major, minor, maint))
}

/// True if the running version is `>=` the passed version string.
pub fn greater_than_equal(compare: &str) -> Result<bool> {
    let (major, minor, maint) = extract(compare)?;
    Ok((MAJOR, MINOR, MAINT) >= (major, minor, maint))
}

/// True if the running version is `<` the passed version string.
pub fn less_than(compare: &str) -> Result<bool> {
    let (major, minor, maint) = extract(compare)?;
    Ok((MAJOR, MINOR, MAINT) < (major, minor, maint))
}

/// Fail unless the running version satisfies the passed minimum.
pub fn min_version(compare: &str) -> Result<()> {
    if greater_than_equal(compare)? {
        Ok(())
    } else {
        Err(Error::general(
            "version::min_version",
            format!("version {} is older than required {}", current(), compare),
        ))
    }
}
