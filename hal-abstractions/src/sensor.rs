//! Temperature/humidity sensor interface

/// Unit the temperature is reported in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TemperatureScale {
    Celsius,
    #[default]
    Fahrenheit,
}

impl TemperatureScale {
    /// Parse a configuration label (`"C"` or `"F"`)
    ///
    /// Anything other than `"C"` selects Fahrenheit, matching the sensor
    /// driver's own default.
    pub fn from_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case("C") {
            Self::Celsius
        } else {
            Self::Fahrenheit
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Celsius => "C",
            Self::Fahrenheit => "F",
        }
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for TemperatureScale {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct LabelVisitor;

        impl serde::de::Visitor<'_> for LabelVisitor {
            type Value = TemperatureScale;

            fn expecting(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str("a temperature scale label")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(TemperatureScale::from_label(v))
            }
        }

        deserializer.deserialize_str(LabelVisitor)
    }
}

/// Combined temperature and humidity sensor (DHT11/DHT22 class)
///
/// Bus timing and checksum verification live inside the driver. A reading
/// that fails either is reported as `f32::NAN`; the engine treats any NaN as
/// an invalid sample. Callers read temperature first, then humidity.
pub trait TempHumiditySensor {
    /// Temperature in the requested scale, NaN when the read failed
    fn read_temperature(&mut self, scale: TemperatureScale) -> f32;

    /// Relative humidity in percent, NaN when the read failed
    fn read_humidity(&mut self) -> f32;
}
