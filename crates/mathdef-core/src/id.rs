use rand::Rng;

/// Alphabet for room ids. Mixed case plus digits keeps 8 characters
/// collision-resistant across the handful of live rooms a process holds.
pub const ROOM_ID_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub const ROOM_ID_LENGTH: usize = 8;

/// Generate a candidate room id. Callers must collision-check against live
/// rooms before using it.
pub fn generate_room_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROOM_ID_LENGTH)
        .map(|_| ROOM_ID_ALPHABET[rng.random_range(0..ROOM_ID_ALPHABET.len())] as char)
        .collect()
}
