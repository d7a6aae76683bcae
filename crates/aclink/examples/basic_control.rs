//! Basic control example: power the unit on, set a target, read status.
//!
//! Run with:
//! ```sh
//! cargo run --example basic_control -- /dev/ttyUSB0
//! ```

use aclink::s21::S21Builder;
use aclink::{AcUnit, FanSpeed, Mode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aclink=debug".into()),
        )
        .init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyUSB0".to_string());

    let mut unit = S21Builder::new().serial_port(&port).build().await?;

    println!(
        "connected: protocol {} v{}",
        unit.protocol_name(),
        unit.protocol_version()
    );

    unit.set_state(true, Mode::Cool, 22.5, FanSpeed::Auto).await?;
    println!("unit on, cooling to 22.5 °C");

    let status = unit.query_status().await?;
    println!(
        "status: power={} mode={} target={:.1} °C fan={}",
        status.power, status.mode, status.target_temp, status.fan_speed
    );

    let room = unit.query_temperature().await?;
    println!("room temperature: {room:.1} °C");

    Ok(())
}
