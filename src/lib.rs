//! Hi-C contact graph toolkit for metagenome binning.
//!
//! The library turns name-grouped Hi-C alignments into a sparse contig contact
//! matrix, normalizes it, reconciles three upstream binning partitions into a
//! consensus and scores host-MGE physical association.

pub mod libs;

pub use libs::io::*;
