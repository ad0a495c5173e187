//! Capability filters attached to a loader.
//!
//! A config carries one (property path, typed value) pair; all configs on a
//! loader act as a conjunction. This table is the normative property
//! grammar; names outside it are rejected when the property is set:
//!
//! | path                     | type |
//! |--------------------------|------|
//! | `impl.impl_type`         | U32  |
//! | `impl.api_version.major` | U16  |
//! | `impl.api_version.minor` | U16  |
//! | `impl.decoder.codec_id`  | U32  |
//! | `impl.encoder.codec_id`  | U32  |
//! | `impl.vpp.fourcc`        | U32  |
//!
//! A type mismatch is only detected when the filter is applied against an
//! implementation description, and fails the application with
//! `Unsupported`.

use crate::dispatch::caps::ImplDescription;
use crate::status::{VplError, VplResult};
use crate::variant::{Variant, VariantValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PropertyKey {
    ImplType,
    ApiVersionMajor,
    ApiVersionMinor,
    DecoderCodecId,
    EncoderCodecId,
    VppFourcc,
}

const GRAMMAR: &[(&str, PropertyKey)] = &[
    ("impl.impl_type", PropertyKey::ImplType),
    ("impl.api_version.major", PropertyKey::ApiVersionMajor),
    ("impl.api_version.minor", PropertyKey::ApiVersionMinor),
    ("impl.decoder.codec_id", PropertyKey::DecoderCodecId),
    ("impl.encoder.codec_id", PropertyKey::EncoderCodecId),
    ("impl.vpp.fourcc", PropertyKey::VppFourcc),
];

/// Index handle for a config created on a loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigHandle(pub(crate) usize);

/// One property filter. Empty until a property is set.
#[derive(Debug, Default)]
pub struct Config {
    property: Option<(PropertyKey, Variant)>,
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// Set the filter property. Unknown names are rejected here; the value
    /// type is checked later, against the description.
    pub fn set_property(&mut self, name: &str, value: Variant) -> VplResult<()> {
        let key = GRAMMAR
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, k)| *k)
            .ok_or(VplError::NotFound)?;
        self.property = Some((key, value));
        Ok(())
    }

    pub fn is_set(&self) -> bool {
        self.property.is_some()
    }

    /// Apply this filter to a description.
    pub(crate) fn matches(&self, desc: &ImplDescription) -> VplResult<bool> {
        let (key, variant) = match &self.property {
            Some(p) => p,
            None => return Ok(true), // an empty config filters nothing
        };
        match key {
            PropertyKey::ImplType => {
                let want = expect_u32(variant)?;
                Ok(desc.impl_type == want)
            }
            PropertyKey::ApiVersionMajor => {
                let want = expect_u16(variant)?;
                Ok(desc.api_version.major == want)
            }
            PropertyKey::ApiVersionMinor => {
                let want = expect_u16(variant)?;
                Ok(desc.api_version.minor == want)
            }
            PropertyKey::DecoderCodecId => {
                let want = expect_u32(variant)?;
                Ok(desc.decoder_ids().contains(&want))
            }
            PropertyKey::EncoderCodecId => {
                let want = expect_u32(variant)?;
                Ok(desc.encoder_ids().contains(&want))
            }
            PropertyKey::VppFourcc => {
                let want = expect_u32(variant)?;
                Ok(desc.vpp_fourccs().contains(&want))
            }
        }
    }
}

fn expect_u32(variant: &Variant) -> VplResult<u32> {
    match variant.value {
        VariantValue::U32(v) => Ok(v),
        _ => Err(VplError::Unsupported),
    }
}

fn expect_u16(variant: &Variant) -> VplResult<u16> {
    match variant.value {
        VariantValue::U16(v) => Ok(v),
        _ => Err(VplError::Unsupported),
    }
}

/// Conjunction of every config against one description. A type mismatch in
/// any config fails the whole application.
pub(crate) fn passes(desc: &ImplDescription, configs: &[Config]) -> VplResult<bool> {
    for config in configs {
        if !config.matches(desc)? {
            return Ok(false);
        }
    }
    Ok(true)
}
