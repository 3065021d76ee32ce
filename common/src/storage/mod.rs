use std::future::Future;
use std::time::Duration;

use crate::error::AppError;

pub mod db;
pub mod document;
pub mod migration;
pub mod tenant;
pub mod types;
pub mod vector;

/// Cap a store call at `limit`. Overruns become `AppError::Timeout`
/// tagged with the store's name, which the retry policy treats as
/// transient.
pub async fn timed<T, F>(store: &'static str, limit: Duration, operation: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(store)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overrun_maps_to_timeout() {
        let err = timed("vector store", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .expect_err("should time out");
        assert!(matches!(err, AppError::Timeout("vector store")));
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let value = timed("document store", Duration::from_secs(1), async { Ok(7) })
            .await
            .expect("passes");
        assert_eq!(value, 7);
    }
}
