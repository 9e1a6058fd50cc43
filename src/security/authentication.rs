use log::trace;
use zeroize::Zeroizing;

use super::key_derivation::{compute_file_key, compute_owner_key, compute_user_hash};
use crate::crypto::rc4_apply;
use crate::error::{PDFResolverError, PDFResult};
use crate::handlers::StandardSecurityHandler;

impl StandardSecurityHandler {
    /// Algorithm 6: Authenticate user password
    ///
    /// Returns the file key when the recomputed `/U` matches.
    pub fn authenticate_user_password(&self, password: &[u8]) -> PDFResult<Zeroizing<Vec<u8>>> {
        let file_key = compute_file_key(&self.dict, &self.file_id, password);
        let computed = Zeroizing::new(compute_user_hash(
            &file_key,
            self.dict.revision,
            &self.file_id,
        )?);

        // R3 and later only fix the first 16 bytes of /U.
        let significant = if self.dict.revision == 2 { 32 } else { 16 };
        if constant_time_eq(&computed[..significant], &self.dict.user_hash[..significant]) {
            Ok(file_key)
        } else {
            trace!("User password check failed");
            Err(PDFResolverError::AuthenticationFailed)
        }
    }

    /// Undo the `/O` cascade with an owner password, giving the padded
    /// user password it protects
    pub fn recover_user_password(&self, owner_password: &[u8]) -> PDFResult<Zeroizing<[u8; 32]>> {
        let key = compute_owner_key(owner_password, self.dict.revision, self.dict.key_length);
        let mut user_password = Zeroizing::new([0u8; 32]);
        user_password.copy_from_slice(&self.dict.owner_hash[..32]);

        if self.dict.revision == 2 {
            rc4_apply(&key, &mut user_password[..])?;
        } else {
            let mut round_key = Zeroizing::new(vec![0u8; key.len()]);
            for round in (0..=19u8).rev() {
                for (k, b) in round_key.iter_mut().zip(key.iter()) {
                    *k = b ^ round;
                }
                rc4_apply(&round_key, &mut user_password[..])?;
            }
        }
        Ok(user_password)
    }

    /// Algorithm 7: Authenticate owner password
    pub fn authenticate_owner_password(&self, password: &[u8]) -> PDFResult<Zeroizing<Vec<u8>>> {
        let user_password = self.recover_user_password(password)?;
        self.authenticate_user_password(&user_password[..]).map_err(|e| {
            trace!("Owner password check failed");
            e
        })
    }
}

/// Constant-time comparison to prevent timing attacks
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{Dictionary, Object};
    use crate::security::compute_owner_hash;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const FILE_ID: &[u8] = b"\x8b\x1d\x02\x61\x9a\xf3\x44\x10\xc7\x5e\x23\x90\x0b\x71\xde\x2a";

    /// Build a handler the way a writer would: O from the passwords, then
    /// U from the resulting file key.
    fn handler(revision: u8, key_length: usize, user: &[u8], owner: &[u8]) -> StandardSecurityHandler {
        let version = if revision == 2 { 1 } else { 2 };
        let owner_hash = compute_owner_hash(owner, user, revision, key_length).unwrap();

        let mut dict = Dictionary::new();
        dict.set("Filter", Object::Name("Standard".into()));
        dict.set("V", Object::Integer(version));
        dict.set("R", Object::Integer(revision as i64));
        dict.set("Length", Object::Integer(key_length as i64 * 8));
        dict.set("O", Object::String(owner_hash.to_vec()));
        dict.set("U", Object::String(vec![0; 32]));
        dict.set("P", Object::Integer(-3904));

        let mut handler = StandardSecurityHandler::new(&dict, FILE_ID).unwrap();
        let file_key = compute_file_key(&handler.dict, FILE_ID, user);
        handler.dict.user_hash = compute_user_hash(&file_key, revision, FILE_ID).unwrap().to_vec();
        handler
    }

    #[rstest]
    #[case(2, 5)]
    #[case(3, 5)]
    #[case(3, 16)]
    fn test_user_password_authentication(#[case] revision: u8, #[case] key_length: usize) {
        let handler = handler(revision, key_length, b"user", b"owner");

        let key = handler.authenticate_user_password(b"user").unwrap();
        assert_eq!(key.len(), key_length);
        assert!(matches!(
            handler.authenticate_user_password(b"wrong"),
            Err(PDFResolverError::AuthenticationFailed)
        ));
    }

    #[rstest]
    #[case(2, 5)]
    #[case(3, 16)]
    fn test_owner_and_user_give_same_key(#[case] revision: u8, #[case] key_length: usize) {
        let handler = handler(revision, key_length, b"user", b"owner");

        let via_user = handler.authenticate_user_password(b"user").unwrap();
        let via_owner = handler.authenticate_owner_password(b"owner").unwrap();
        assert_eq!(*via_user, *via_owner);
        assert!(handler.authenticate_owner_password(b"user").is_err());
    }

    #[test_log::test]
    fn test_recover_user_password() {
        let handler = handler(3, 16, b"secret", b"boss");
        let recovered = handler.recover_user_password(b"boss").unwrap();
        assert_eq!(&recovered[..6], b"secret");
    }

    #[test_log::test]
    fn test_empty_owner_password_scenario() {
        let handler = handler(3, 16, b"x", b"");

        let state = handler.authenticate_password(b"x").unwrap();
        assert_eq!(state.file_key().len(), 16);
        assert!(matches!(
            handler.authenticate_password(b"y"),
            Err(PDFResolverError::AuthenticationFailed)
        ));
    }

    /// Encryption dictionaries written by other producers
    fn fixed_handler(
        version: i64,
        revision: i64,
        bits: i64,
        p: i64,
        o: &str,
        u: &str,
        id: &str,
    ) -> StandardSecurityHandler {
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::Name("Standard".into()));
        dict.set("V", Object::Integer(version));
        dict.set("R", Object::Integer(revision));
        dict.set("Length", Object::Integer(bits));
        dict.set("O", Object::String(hex::decode(o).unwrap()));
        dict.set("U", Object::String(hex::decode(u).unwrap()));
        dict.set("P", Object::Integer(p));
        StandardSecurityHandler::new(&dict, &hex::decode(id).unwrap()).unwrap()
    }

    // pdf.js crypto test document, RC4 128-bit
    #[rstest]
    #[case(
        2, 3, 128, -1028,
        "80c30496916f20736c3ae61b135491f20d5612e3ff5ebbe9564fd86b9aca7c5d",
        "6a0c8d3e591900bc6a647d91bdaa001800000000000000000000000000000000",
        "f6c6af17f372528d524d9a80d1efdf18",
        b"123456", b"654321",
        "4e3bcf7b7cdd332d047259a3606132de"
    )]
    // RC4 40-bit
    #[case(
        1, 2, 40, -44,
        "94e8094419662a774442fb072e3d9f19e9d130ec09a4d0061e78fe920f7ab62f",
        "d83fe8c6e10495ecde93e470d372bb99614ca49ca40c8d9c82a154615bcff2f7",
        "0123456789abcdef0123456789abcdef",
        b"user", b"owner",
        "4173f564b4"
    )]
    #[allow(clippy::too_many_arguments)]
    fn test_known_documents(
        #[case] version: i64,
        #[case] revision: i64,
        #[case] bits: i64,
        #[case] p: i64,
        #[case] o: &str,
        #[case] u: &str,
        #[case] id: &str,
        #[case] user: &[u8],
        #[case] owner: &[u8],
        #[case] file_key: &str,
    ) {
        let handler = fixed_handler(version, revision, bits, p, o, u, id);
        let key_length = (bits / 8) as usize;

        let via_user = handler.authenticate_user_password(user).unwrap();
        assert_eq!(hex::encode(&*via_user), file_key);
        let via_owner = handler.authenticate_owner_password(owner).unwrap();
        assert_eq!(hex::encode(&*via_owner), file_key);

        // Writing the values again reproduces the stored strings.
        let owner_hash = compute_owner_hash(owner, user, revision as u8, key_length).unwrap();
        assert_eq!(hex::encode(owner_hash), o);
        let user_hash = compute_user_hash(&via_user, revision as u8, &hex::decode(id).unwrap()).unwrap();
        assert_eq!(hex::encode(user_hash), u);

        assert!(matches!(
            handler.authenticate_password(b"wrong"),
            Err(PDFResolverError::AuthenticationFailed)
        ));
    }

    #[test_log::test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
