//! First-run seed data: the default ramp schedule and the mailbox pools
//! from configuration. Each table is only seeded when it is empty, so
//! user edits survive restarts.

use log::info;
use secrecy::ExposeSecret;

use crate::config::Config;
use crate::secrets::CredentialCipher;
use crate::types::MailboxRole;

use super::{identity_repo, schedule_repo, Database};

/// The default 15-day ramp: 5 to 50 in steps of 5, then 60 to 100 in
/// steps of 10.
pub const DEFAULT_RAMP: [(u32, u32); 15] = [
    (1, 5),
    (2, 10),
    (3, 15),
    (4, 20),
    (5, 25),
    (6, 30),
    (7, 35),
    (8, 40),
    (9, 45),
    (10, 50),
    (11, 60),
    (12, 70),
    (13, 80),
    (14, 90),
    (15, 100),
];

/// Seeds schedule and identity tables when empty.
pub fn run(
    db: &Database,
    config: &Config,
    cipher: Option<&CredentialCipher>,
) -> crate::error::Result<()> {
    if schedule_repo::count(db)? == 0 {
        for (day, target) in DEFAULT_RAMP {
            schedule_repo::create(db, day, target, true)?;
        }
        info!("Seeded {} ramp schedule entries", DEFAULT_RAMP.len());
    }

    if identity_repo::count(db)? == 0 {
        for sender in &config.sender_addresses {
            identity_repo::insert(db, sender, MailboxRole::Sender, None)?;
        }

        for recipient in &config.recipient_addresses {
            let credential = match (config.recipient_credentials.get(recipient), cipher) {
                (Some(secret), Some(cipher)) => Some(cipher.encrypt(secret.expose_secret())?),
                (Some(_), None) => {
                    log::warn!(
                        "Credential configured for {} but no credential key set; not storing",
                        recipient
                    );
                    None
                }
                (None, _) => None,
            };
            identity_repo::insert(db, recipient, MailboxRole::Recipient, credential.as_deref())?;
        }

        info!(
            "Seeded {} sender and {} recipient identities",
            config.sender_addresses.len(),
            config.recipient_addresses.len()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn test_config() -> Config {
        Config::from_vars(|name| match name {
            "SENDER_ADDRESSES" => Some("a@s.example,b@s.example".to_string()),
            "RECIPIENT_ADDRESSES" => Some("c@r.example,d@r.example".to_string()),
            "RECIPIENT_IMAP_CREDENTIALS" => Some("c@r.example:secret-pass".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_seed_schedule() {
        let db = Database::open_in_memory().unwrap();
        run(&db, &test_config(), None).unwrap();

        let rows = schedule_repo::list(&db).unwrap();
        assert_eq!(rows.len(), 15);
        assert_eq!(rows[0].target_emails, 5);
        assert_eq!(rows[14].target_emails, 100);
        assert!(rows.iter().all(|r| r.enabled));
    }

    #[test]
    fn test_seed_is_one_shot() {
        let db = Database::open_in_memory().unwrap();
        run(&db, &test_config(), None).unwrap();

        // User edits one entry; reseeding must not clobber it.
        let first = schedule_repo::list(&db).unwrap()[0].clone();
        schedule_repo::update(&db, first.id, 999, true).unwrap();

        run(&db, &test_config(), None).unwrap();
        assert_eq!(schedule_repo::count(&db).unwrap(), 15);
        assert_eq!(
            schedule_repo::get(&db, first.id).unwrap().unwrap().target_emails,
            999
        );
    }

    #[test]
    fn test_seed_identities_with_encrypted_credential() {
        let db = Database::open_in_memory().unwrap();
        let cipher = CredentialCipher::from_hex_key(TEST_KEY).unwrap();
        run(&db, &test_config(), Some(&cipher)).unwrap();

        assert_eq!(identity_repo::count(&db).unwrap(), 4);

        let with_cred = identity_repo::find_by_email(&db, "c@r.example")
            .unwrap()
            .unwrap();
        let stored = with_cred.imap_credential.unwrap();
        // Stored encrypted, decryptable back to the configured secret.
        assert_ne!(stored, "secret-pass");
        assert_eq!(cipher.decrypt(&stored).unwrap(), "secret-pass");

        let without = identity_repo::find_by_email(&db, "d@r.example")
            .unwrap()
            .unwrap();
        assert!(without.imap_credential.is_none());
    }

    #[test]
    fn test_seed_identities_without_cipher_skips_credential() {
        let db = Database::open_in_memory().unwrap();
        run(&db, &test_config(), None).unwrap();

        let row = identity_repo::find_by_email(&db, "c@r.example")
            .unwrap()
            .unwrap();
        assert!(row.imap_credential.is_none());
    }
}
