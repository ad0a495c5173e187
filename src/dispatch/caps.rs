//! C-layout capability structures shared between the dispatcher and the
//! runtimes it loads. This crate exports the same layout through its own
//! `ffi` module, so it is loadable by its own dispatcher.

use crate::param::{CodecId, FourCc, ImplType, Version};
use crate::session::API_VERSION;

pub const MAX_CODECS: usize = 8;
pub const MAX_VPP_FORMATS: usize = 16;
pub const IMPL_NAME_LEN: usize = 32;

/// Delivery format accepted by capability queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CapsFormat {
    ImplDescStructure = 1,
}

impl CapsFormat {
    pub fn from_u32(v: u32) -> Option<CapsFormat> {
        if v == CapsFormat::ImplDescStructure as u32 {
            Some(CapsFormat::ImplDescStructure)
        } else {
            None
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CApiVersion {
    pub major: u16,
    pub minor: u16,
}

impl From<Version> for CApiVersion {
    fn from(v: Version) -> CApiVersion {
        CApiVersion {
            major: v.major,
            minor: v.minor,
        }
    }
}

/// Parameter block passed to a runtime's initialization entry point.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CInitParam {
    pub impl_type: u32,
    pub version: CApiVersion,
    pub external_threads: u16,
}

/// Capability descriptor a runtime hands back from its query entry point.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ImplDescription {
    pub struct_version: CApiVersion,
    pub impl_type: u32,
    pub api_version: CApiVersion,
    pub impl_name: [u8; IMPL_NAME_LEN],
    pub num_decoders: u32,
    pub decoders: [u32; MAX_CODECS],
    pub num_encoders: u32,
    pub encoders: [u32; MAX_CODECS],
    pub num_vpp_formats: u32,
    pub vpp_formats: [u32; MAX_VPP_FORMATS],
}

impl ImplDescription {
    /// The descriptor of this crate's own software runtime.
    pub fn software_runtime() -> ImplDescription {
        let mut desc = ImplDescription {
            struct_version: CApiVersion { major: 1, minor: 0 },
            impl_type: ImplType::Software.as_u32(),
            api_version: API_VERSION.into(),
            impl_name: [0; IMPL_NAME_LEN],
            num_decoders: 0,
            decoders: [0; MAX_CODECS],
            num_encoders: 0,
            encoders: [0; MAX_CODECS],
            num_vpp_formats: 0,
            vpp_formats: [0; MAX_VPP_FORMATS],
        };
        let name = b"vplite software runtime";
        desc.impl_name[..name.len()].copy_from_slice(name);

        for codec in crate::backend::DECODE_CODECS {
            desc.decoders[desc.num_decoders as usize] = codec.as_u32();
            desc.num_decoders += 1;
        }
        for codec in crate::backend::ENCODE_CODECS {
            desc.encoders[desc.num_encoders as usize] = codec.as_u32();
            desc.num_encoders += 1;
        }
        for fourcc in [
            FourCc::I420,
            FourCc::I010,
            FourCc::Nv12,
            FourCc::P010,
            FourCc::Yuy2,
            FourCc::Nv16,
            FourCc::P210,
            FourCc::Rgb4,
        ] {
            desc.vpp_formats[desc.num_vpp_formats as usize] = fourcc.as_u32();
            desc.num_vpp_formats += 1;
        }
        desc
    }

    pub fn decoder_ids(&self) -> &[u32] {
        &self.decoders[..(self.num_decoders as usize).min(MAX_CODECS)]
    }

    pub fn encoder_ids(&self) -> &[u32] {
        &self.encoders[..(self.num_encoders as usize).min(MAX_CODECS)]
    }

    pub fn vpp_fourccs(&self) -> &[u32] {
        &self.vpp_formats[..(self.num_vpp_formats as usize).min(MAX_VPP_FORMATS)]
    }

    pub fn name(&self) -> &str {
        let end = self
            .impl_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(IMPL_NAME_LEN);
        std::str::from_utf8(&self.impl_name[..end]).unwrap_or("")
    }

    pub fn supports_decoder(&self, codec: CodecId) -> bool {
        self.decoder_ids().contains(&codec.as_u32())
    }

    pub fn supports_encoder(&self, codec: CodecId) -> bool {
        self.encoder_ids().contains(&codec.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_descriptor_lists_the_supported_codecs() {
        let desc = ImplDescription::software_runtime();
        assert_eq!(desc.impl_type, ImplType::Software.as_u32());
        assert_eq!(desc.api_version, CApiVersion { major: 1, minor: 35 });
        assert!(desc.supports_decoder(CodecId::Av1));
        assert!(desc.supports_encoder(CodecId::Hevc));
        assert!(!desc.supports_encoder(CodecId::Av1));
        assert_eq!(desc.vpp_fourccs().len(), 8);
        assert_eq!(desc.name(), "vplite software runtime");
    }

    #[test]
    fn caps_format_round_trips() {
        assert_eq!(CapsFormat::from_u32(1), Some(CapsFormat::ImplDescStructure));
        assert_eq!(CapsFormat::from_u32(7), None);
    }
}
