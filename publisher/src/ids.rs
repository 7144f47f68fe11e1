use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of generated process row keys.
pub const ROW_KEY_LEN: usize = 7;

/// A random key drawn from uppercase letters and digits. At the row counts a
/// spreadsheet holds collisions are not worth retrying for.
pub fn alnum_id(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}
