//! RC4 stream cipher for PDF.
//!
//! Used by the V2 crypt method (R2-R4) and inside the R2-R4 password
//! algorithms. RC4 is symmetric, so one function both encrypts and decrypts.
//!
//! PDF Spec: Section 7.6.2 - General Encryption Algorithm

/// RC4 keystream generator.
struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    /// Key-scheduling algorithm. PDF keys are 5-16 bytes.
    fn new(key: &[u8]) -> Self {
        let mut s = [0u8; 256];
        for (i, val) in s.iter_mut().enumerate() {
            *val = i as u8;
        }

        if !key.is_empty() {
            let mut j = 0u8;
            for i in 0..256 {
                j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
                s.swap(i, j as usize);
            }
        }

        Self { s, i: 0, j: 0 }
    }

    fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let k = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
            *byte ^= self.s[k as usize];
        }
    }
}

/// Encrypt or decrypt `data` with `key`.
pub fn rc4_crypt(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    Rc4::new(key).apply(&mut out);
    out
}

/// Apply `rounds` passes with the key XOR-ed by the pass number, counting up
/// (`0..rounds`) when encrypting and down when decrypting.
///
/// Shared by Algorithm 3 (computing /O) and Algorithm 7 (recovering the user
/// password from /O) for R3 and later.
pub fn rc4_xor_rounds(key: &[u8], data: &[u8], rounds: u8, descending: bool) -> Vec<u8> {
    let mut out = data.to_vec();
    let mut pass = |i: u8| {
        let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
        Rc4::new(&round_key).apply(&mut out);
    };
    if descending {
        (0..rounds).rev().for_each(&mut pass);
    } else {
        (0..rounds).for_each(&mut pass);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rc4_known_vector() {
        // Key "Key", plaintext "Plaintext" -> BBF316E8D940AF0AD3
        let ciphertext = rc4_crypt(b"Key", b"Plaintext");
        assert_eq!(ciphertext, [0xBB, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3]);
    }

    #[test]
    fn test_rc4_second_known_vector() {
        // Key "Wiki", plaintext "pedia" -> 1021BF0420
        assert_eq!(rc4_crypt(b"Wiki", b"pedia"), [0x10, 0x21, 0xBF, 0x04, 0x20]);
    }

    #[test]
    fn test_rc4_symmetric() {
        let ciphertext = rc4_crypt(b"testkey", b"Hello, World!");
        assert_ne!(&ciphertext[..], b"Hello, World!");
        assert_eq!(rc4_crypt(b"testkey", &ciphertext), b"Hello, World!");
    }

    #[test]
    fn test_rc4_empty() {
        assert!(rc4_crypt(b"testkey", b"").is_empty());
    }

    #[test]
    fn test_xor_rounds_invert() {
        let key = [7u8; 16];
        let data = b"thirty-two bytes of padded input";
        let forward = rc4_xor_rounds(&key, data, 20, false);
        assert_eq!(rc4_xor_rounds(&key, &forward, 20, true), data);
    }
}
