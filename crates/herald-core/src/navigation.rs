use crate::error::AppError;
use crate::retry::RetryPolicy;
use crate::traits::PageDriver;

/// Navigate `page` to `url`, retrying transient failures with `policy`.
///
/// A failed navigation whose tab nevertheless ended up at the target is a
/// success: the CMS often aborts the load event after the document arrived.
pub async fn navigate<P: PageDriver>(
    page: &P,
    url: &str,
    policy: &RetryPolicy,
) -> Result<(), AppError> {
    policy
        .run("navigate", |attempt| async move {
            match page.goto(url).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    if let Ok(current) = page.current_url().await
                        && same_location(&current, url)
                    {
                        tracing::debug!(%url, attempt, error = %e, "Already at target");
                        return Ok(());
                    }
                    Err(e)
                }
            }
        })
        .await
}

/// Location equality ignoring trailing slashes.
pub fn same_location(current: &str, target: &str) -> bool {
    current.trim_end_matches('/') == target.trim_end_matches('/')
}
