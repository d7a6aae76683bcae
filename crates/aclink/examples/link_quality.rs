//! Poll the unit and print link-quality metrics.
//!
//! Run with:
//! ```sh
//! cargo run --example link_quality -- /dev/ttyUSB0
//! ```

use std::time::Duration;

use aclink::AcUnit;
use aclink::s21::S21Builder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyUSB0".to_string());

    let mut unit = S21Builder::new().serial_port(&port).build().await?;

    loop {
        let _ = unit.query_status().await;
        let _ = unit.query_temperature().await;

        let quality = unit.engine().quality();
        let status = unit.engine().link_status();
        println!(
            "score={:5.1} stable={} avg={:6.1}ms min={:6.1}ms max={:6.1}ms \
             ok={} err={} timeouts={} checksum={}",
            quality.quality_score,
            quality.stable,
            quality.avg_response_ms,
            quality.min_response_ms,
            quality.max_response_ms,
            status.success_count,
            status.error_count,
            quality.timeout_count,
            quality.checksum_error_count,
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}
