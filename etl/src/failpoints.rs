use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, EtlError, EtlResult};

/// Fires after a page was upserted and before its ids are recorded as excepted.
pub const PIPELINE__AFTER_UPSERT: &str = "pipeline.after_upsert";
/// Fires after a sweep was drained and before its excepted ids are reset.
pub const PIPELINE__BEFORE_SWEEP_RESET: &str = "pipeline.before_sweep_reset";
/// Fires after every kind was drained and before the watermark advances.
pub const PIPELINE__BEFORE_WATERMARK_ADVANCE: &str = "pipeline.before_watermark_advance";

/// Returns an error when the fail point `name` is configured to fire.
///
/// The `transient` parameter raises an error the backoff retries, anything else raises a
/// permanent one.
pub fn etl_fail_point(name: &str) -> EtlResult<()> {
    fail_point!(name, |parameter| {
        let error_kind = match parameter.as_deref() {
            Some("transient") => ErrorKind::WithTransientFailure,
            _ => ErrorKind::WithPermanentFailure,
        };

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
