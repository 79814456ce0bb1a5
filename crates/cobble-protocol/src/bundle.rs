//! Bundles: several clientbound packets the client applies in one tick.
//!
//! On the wire a bundle is a delimiter frame, the member frames, and
//! another delimiter frame. Each member keeps its own frame, so a member
//! that ends in a raw tail still has a clear end.
//!
//! Encoding elides degenerate bundles: no members means no frames, and a
//! single member is sent on its own without delimiters.

use crate::catalog::Catalog;
use crate::error::{DecodeError, EncodeError};
use crate::packets::PacketSet;

/// Most members the assembler accepts before calling a bundle malformed.
pub const MAX_BUNDLE_PACKETS: usize = 4096;

/// Encodes `packets` as the frames of one bundle.
pub fn encode_bundle<P: PacketSet>(
    catalog: &Catalog<P>,
    packets: &[P],
) -> Result<Vec<Vec<u8>>, EncodeError> {
    if packets.iter().any(P::is_bundle_delimiter) {
        return Err(EncodeError::InconsistentFlags {
            ty: "bundle",
            detail: "bundles cannot contain delimiters".to_owned(),
        });
    }
    match packets {
        [] => Ok(Vec::new()),
        [single] => Ok(vec![catalog.encode(single)?]),
        many => {
            let delimiter = P::bundle_delimiter().ok_or_else(|| EncodeError::NotInCatalog {
                kind: "bundle delimiter".to_owned(),
                version: catalog.version(),
                direction: catalog.direction(),
                stage: catalog.stage(),
            })?;
            let marker = catalog.encode(&delimiter)?;
            let mut frames = Vec::with_capacity(many.len() + 2);
            frames.push(marker.clone());
            for packet in many {
                frames.push(catalog.encode(packet)?);
            }
            frames.push(marker);
            Ok(frames)
        }
    }
}

/// What the assembler produced from one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Assembled<P> {
    /// A packet outside any bundle.
    Single(P),
    /// A complete bundle, delimiters removed.
    Bundle(Vec<P>),
}

/// Regroups decoded frames into packets and bundles.
#[derive(Debug)]
pub struct BundleAssembler<P> {
    open: Option<Vec<P>>,
}

impl<P: PacketSet> Default for BundleAssembler<P> {
    fn default() -> Self {
        Self { open: None }
    }
}

impl<P: PacketSet> BundleAssembler<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a bundle has been opened and not yet closed.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Feeds one decoded packet.
    ///
    /// Returns `None` while a bundle is being collected.
    pub fn push(&mut self, packet: P) -> Result<Option<Assembled<P>>, DecodeError> {
        if packet.is_bundle_delimiter() {
            return Ok(match self.open.take() {
                Some(members) => Some(Assembled::Bundle(members)),
                None => {
                    self.open = Some(Vec::new());
                    None
                }
            });
        }
        match &mut self.open {
            Some(members) => {
                if members.len() >= MAX_BUNDLE_PACKETS {
                    return Err(DecodeError::MalformedBundle("too many packets in bundle"));
                }
                members.push(packet);
                Ok(None)
            }
            None => Ok(Some(Assembled::Single(packet))),
        }
    }

    /// Ends the stream; an open bundle is an error.
    pub fn finish(self) -> Result<(), DecodeError> {
        match self.open {
            Some(_) => Err(DecodeError::MalformedBundle("stream ended inside a bundle")),
            None => Ok(()),
        }
    }
}

/// Decodes a whole frame stream.
pub fn decode_frames<P: PacketSet>(
    catalog: &Catalog<P>,
    frames: &[Vec<u8>],
) -> Result<Vec<Assembled<P>>, DecodeError> {
    let mut assembler = BundleAssembler::new();
    let mut out = Vec::new();
    for frame in frames {
        if let Some(item) = assembler.push(catalog.decode(frame)?)? {
            out.push(item);
        }
    }
    assembler.finish()?;
    Ok(out)
}
