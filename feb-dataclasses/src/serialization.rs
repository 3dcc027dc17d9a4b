//! Serialization/Deserialization helpers
//!
//! Everything on the wire is little endian,
//! as written by the driver on the DAQ machine.

// re-exports
pub use crate::errors::SerializationError;

pub fn parse_u8(bs : &[u8], pos : &mut usize) -> u8 {
  let value = bs[*pos];
  *pos += 1;
  value
}

/// Get u16 from a bytestream and move on the position marker
///
/// # Arguments 
///
/// * bs  : the bytestream
/// * pos : position of the first byte, will be advanced
///         by 2
pub fn parse_u16(bs : &[u8], pos : &mut usize) -> u16 {
  let value = u16::from_le_bytes([bs[*pos], bs[*pos+1]]);
  *pos += 2;
  value
}

pub fn parse_u32(bs : &[u8], pos : &mut usize) -> u32 {
  let value = u32::from_le_bytes([bs[*pos], bs[*pos+1], bs[*pos+2], bs[*pos+3]]);
  *pos += 4;
  value
}

/// Encode/decode structs to Vec::<u8> to write to a file or
/// send over the network
pub trait Serialization {

  /// The size of the serialized bytestream. 
  /// All our wire formats have a fixed size.
  const SIZE : usize;

  /// Check that there are at least SIZE bytes left 
  /// in the stream, starting at pos
  fn verify_fixed(stream : &[u8],
                  pos    : usize) -> Result<(), SerializationError> {
    if stream.len() < pos + Self::SIZE {
      return Err(SerializationError::StreamTooShort);
    }
    Ok(())
  }

  /// Decode a serializable from a bytestream  
  fn from_bytestream(stream : &[u8], 
                     pos    : &mut usize)
    -> Result<Self, SerializationError>
    where Self : Sized;

  /// Encode a serializable to a bytestream  
  fn to_bytestream(&self) -> Vec<u8>;
}
