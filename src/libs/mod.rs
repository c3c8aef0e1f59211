pub mod assoc;
pub mod bins;
pub mod consensus;
pub mod contact;
pub mod contig;
pub mod enzyme;
pub mod error;
pub mod insert;
pub mod io;
pub mod matrix;
pub mod norm;
pub mod pairs;
pub mod sam;

pub use error::HicError;
