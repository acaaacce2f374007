use ltmesh::PeerId;

/// A deterministic, easy-to-eyeball peer id for test fixtures.
pub fn peer(b: u8) -> PeerId {
  let mut bytes = [0u8; 32];
  bytes[0] = b;
  bytes[31] = b;
  PeerId::new(bytes)
}
