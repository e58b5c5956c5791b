//! Collaborators the retrieval steps delegate to.
//!
//! Transport, numeric post-processing and netCDF writing live outside this
//! crate. Implementations return `anyhow::Result`; the steps map failures
//! into typed [`AdaptorError`](crate::AdaptorError) variants.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::Read;

use adaptor_common::Request;
use definitions::FieldHeader;

use crate::export::NetcdfLayout;
use crate::options::ReduceSpec;

/// Gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One message returned by the backend, with its decoded header.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedField {
    pub header: FieldHeader,
    pub payload: Bytes,
}

impl RetrievedField {
    pub fn new(header: FieldHeader, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    /// Decompress the payload if it is gzip-wrapped.
    pub fn gunzipped(self) -> std::io::Result<Self> {
        if !self.payload.starts_with(&GZIP_MAGIC) {
            return Ok(self);
        }
        let mut decoder = flate2::read::GzDecoder::new(self.payload.as_ref());
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(Self {
            header: self.header,
            payload: Bytes::from(decompressed),
        })
    }
}

/// Backend transport: turns a backend request into decoded messages.
#[async_trait]
pub trait FieldSource: Send + Sync {
    /// Fetch the fields addressed by a backend-shaped request.
    ///
    /// The source may return more or fewer fields than requested.
    async fn fetch(&self, request: &Request) -> Result<Vec<RetrievedField>>;
}

/// Reduction/aggregation applied between fetch and reformat.
#[async_trait]
pub trait PostProcessor: Send + Sync {
    async fn reduce(&self, spec: &ReduceSpec, fields: Vec<RetrievedField>) -> Result<Vec<RetrievedField>>;
}

/// Writes fields into a netCDF file laid out as described.
#[async_trait]
pub trait Reformatter: Send + Sync {
    async fn to_netcdf(&self, layout: &NetcdfLayout, fields: &[RetrievedField]) -> Result<Bytes>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::generators::{fake_grib_message, gzip};

    #[test]
    fn test_gunzip_compressed_payload() {
        let message = fake_grib_message(3, 40);
        let field = RetrievedField::new(FieldHeader::new(), gzip(&message));
        assert_eq!(field.gunzipped().unwrap().payload.as_ref(), message.as_slice());
    }

    #[test]
    fn test_plain_payload_untouched() {
        let message = fake_grib_message(3, 40);
        let field = RetrievedField::new(FieldHeader::new(), message.clone());
        assert_eq!(field.gunzipped().unwrap().payload.as_ref(), message.as_slice());
    }
}
