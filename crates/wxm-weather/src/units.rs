//! Unit conversions applied to readings before export.
//!
//! Every conversion is pure. Toggles come from `[conversions]` in the config
//! and apply per family: temperature (temperature, feels-like, dew point),
//! wind (speed, gust), precipitation (rate, accumulation) and pressure.

use chrono::{DateTime, FixedOffset};
use wxm_core::ConversionConfig;

use crate::types::Reading;

pub const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

const SECTOR_WIDTH: f64 = 360.0 / COMPASS_POINTS.len() as f64;

pub const MPH_PER_MPS: f64 = 2.236936;
pub const INCHES_PER_MM: f64 = 0.0393700787;
pub const INHG_PER_HPA: f64 = 0.02952998307;

/// Map a bearing in degrees to a 16-point compass label.
///
/// Sector boundaries round half-up, so 11.25° is "NNE". Bearings outside
/// 0..360 wrap; non-finite input maps to "N".
pub fn cardinal_direction(degrees: f64) -> &'static str {
    if !degrees.is_finite() {
        return COMPASS_POINTS[0];
    }
    let index = (degrees / SECTOR_WIDTH + 0.5).floor() as i64;
    COMPASS_POINTS[index.rem_euclid(COMPASS_POINTS.len() as i64) as usize]
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn meters_per_second_to_mph(mps: f64) -> f64 {
    mps * MPH_PER_MPS
}

pub fn millimeters_to_inches(mm: f64) -> f64 {
    mm * INCHES_PER_MM
}

pub fn hectopascals_to_inches_mercury(hpa: f64) -> f64 {
    hpa * INHG_PER_HPA
}

/// Fixed two-decimal rendering used by both sinks
pub fn two_decimals(value: f64) -> String {
    format!("{:.2}", value)
}

/// Unit labels matching the values in a [`ConvertedReading`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Units {
    pub temperature: &'static str,
    pub wind_speed: &'static str,
    pub precipitation: &'static str,
    pub pressure: &'static str,
}

impl Units {
    pub fn for_conversions(conversions: &ConversionConfig) -> Self {
        Self {
            temperature: if conversions.celsius_to_fahrenheit { "°F" } else { "°C" },
            wind_speed: if conversions.mps_to_mph { "MPH" } else { "m/s" },
            precipitation: if conversions.mm_to_inch { "in" } else { "mm" },
            pressure: if conversions.hpa_to_inhg { "inHg" } else { "hPa" },
        }
    }
}

/// A reading after unit conversion. The source [`Reading`] is left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedReading {
    pub timestamp: DateTime<FixedOffset>,
    pub temperature: f64,
    pub feels_like: f64,
    pub dew_point: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub wind_gust: f64,
    pub wind_direction_degrees: f64,
    pub wind_direction_cardinal: &'static str,
    pub uv_index: f64,
    pub precipitation: f64,
    pub precipitation_accumulated: f64,
    pub pressure: f64,
    pub solar_irradiance: f64,
    pub icon: String,
    pub units: Units,
}

impl ConvertedReading {
    pub fn new(reading: &Reading, conversions: &ConversionConfig) -> Self {
        let temperature = |c: f64| {
            if conversions.celsius_to_fahrenheit {
                celsius_to_fahrenheit(c)
            } else {
                c
            }
        };
        let wind = |v: f64| {
            if conversions.mps_to_mph {
                meters_per_second_to_mph(v)
            } else {
                v
            }
        };
        let precipitation = |mm: f64| {
            if conversions.mm_to_inch {
                millimeters_to_inches(mm)
            } else {
                mm
            }
        };

        Self {
            timestamp: reading.timestamp,
            temperature: temperature(reading.temperature),
            feels_like: temperature(reading.feels_like),
            dew_point: temperature(reading.dew_point),
            humidity: reading.humidity,
            wind_speed: wind(reading.wind_speed),
            wind_gust: wind(reading.wind_gust),
            wind_direction_degrees: reading.wind_direction,
            wind_direction_cardinal: cardinal_direction(reading.wind_direction),
            uv_index: reading.uv_index,
            precipitation: precipitation(reading.precipitation),
            precipitation_accumulated: precipitation(reading.precipitation_accumulated),
            pressure: if conversions.hpa_to_inhg {
                hectopascals_to_inches_mercury(reading.pressure)
            } else {
                reading.pressure
            },
            solar_irradiance: reading.solar_irradiance,
            icon: reading.icon.clone(),
            units: Units::for_conversions(conversions),
        }
    }
}
