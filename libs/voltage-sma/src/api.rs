//! Battery inverter control
//!
//! Operating-mode switches built from several register writes. Each
//! operation attempts all of its writes, even after one failed, and then
//! reports the first failure.

use crate::catalog::{
    BATTERY_CHARGE_MAX_IN_WATTS, BMS_OPERATING_MODE, EXTERNAL_POWER_CONTROL,
    EXTERNAL_POWER_IN_WATTS, INVERTER_NOMINAL_POWER, POWER_RANGE_MAX_IN_PERCENT,
    POWER_RANGE_MIN_IN_PERCENT,
};
use crate::error::{Result, SmaError};
use crate::session::RegisterAccess;
use crate::transport::WordTransport;
use tracing::info;

/// Values of the external power control register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExternalPowerControl {
    /// Power follows the external set-point; self-consumption is off
    Active = 802,
    /// Self-consumption, the normal operating mode
    Inactive = 803,
}

/// Values of the BMS operating mode register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BmsOperatingMode {
    Off = 303,
    On = 308,
    Automatic = 1438,
    Charge = 2289,
    Discharge = 2290,
    Default = 2424,
}

impl From<ExternalPowerControl> for f64 {
    fn from(value: ExternalPowerControl) -> Self {
        f64::from(value as u32)
    }
}

impl From<BmsOperatingMode> for f64 {
    fn from(value: BmsOperatingMode) -> Self {
        f64::from(value as u32)
    }
}

/// Keep the first error, keep going
fn first_error(results: impl IntoIterator<Item = Result<()>>) -> Result<()> {
    results.into_iter().fold(Ok(()), |acc, result| acc.and(result))
}

impl<T: WordTransport> RegisterAccess<T> {
    /// Hand battery control back to the inverter's own self-consumption logic
    pub async fn set_self_consumption_mode(&mut self) -> Result<()> {
        info!("Switching to self-consumption mode");
        let control = self
            .try_write_f64(&EXTERNAL_POWER_CONTROL, ExternalPowerControl::Inactive.into())
            .await;
        let bms = self
            .try_write_f64(&BMS_OPERATING_MODE, BmsOperatingMode::Automatic.into())
            .await;
        first_error([control, bms])
    }

    /// Drive the battery with a fixed set-point; positive watts discharge, negative charge
    pub async fn set_external_power_control_mode(&mut self, watts: f64) -> Result<()> {
        info!("Switching to external power control: {} W", watts);
        let control = self
            .try_write_f64(&EXTERNAL_POWER_CONTROL, ExternalPowerControl::Active.into())
            .await;
        let power = self.try_write_f64(&EXTERNAL_POWER_IN_WATTS, watts).await;
        let bms = self
            .try_write_f64(&BMS_OPERATING_MODE, BmsOperatingMode::Charge.into())
            .await;
        let charge_limit = self
            .try_write_f64(&BATTERY_CHARGE_MAX_IN_WATTS, watts.abs())
            .await;
        first_error([control, power, bms, charge_limit])
    }

    /// Limit charge/discharge power, in percent of nominal power
    pub async fn set_power_range_in_percent(&mut self, min: f64, max: f64) -> Result<()> {
        info!("Power range: {}% .. {}%", min, max);
        let low = self.try_write_f64(&POWER_RANGE_MIN_IN_PERCENT, min).await;
        let high = self.try_write_f64(&POWER_RANGE_MAX_IN_PERCENT, max).await;
        first_error([low, high])
    }

    /// Limit charge/discharge power in watts, converted through the nominal power
    pub async fn set_power_range_in_watts(&mut self, min: f64, max: f64) -> Result<()> {
        let nominal = self.nominal_power().await?;
        if nominal == 0.0 {
            return Err(SmaError::invalid_data_type(
                "nominal power is 0, cannot convert watts to percent",
            ));
        }
        self.set_power_range_in_percent(100.0 * min / nominal, 100.0 * max / nominal)
            .await
    }

    /// Rated power in watts
    pub async fn nominal_power(&mut self) -> Result<f64> {
        let value = self.try_read_register(&INVERTER_NOMINAL_POWER).await?;
        if !value.is_valid() {
            return Err(SmaError::invalid_data_type(format!(
                "{} reported no data",
                INVERTER_NOMINAL_POWER.identifier
            )));
        }
        Ok(value.as_f64())
    }
}
