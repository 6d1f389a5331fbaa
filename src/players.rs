use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng};

/// Mints 128-bit bearer tokens as 32 lowercase hex characters. Two
/// independent OS-seeded generators supply the halves.
#[derive(Debug)]
pub struct TokenMinter {
    generator_one: StdRng,
    generator_two: StdRng,
}

impl TokenMinter {
    pub fn new() -> Self {
        Self {
            generator_one: StdRng::from_os_rng(),
            generator_two: StdRng::from_os_rng(),
        }
    }

    pub fn mint(&mut self) -> String {
        format!(
            "{:016x}{:016x}",
            self.generator_one.random::<u64>(),
            self.generator_two.random::<u64>()
        )
    }
}

impl Default for TokenMinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Syntactic token check only; whether the token belongs to a live player
/// is a separate lookup.
pub fn is_valid_token(token: &str) -> bool {
    token.len() == 32 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

#[derive(Clone, Debug)]
pub struct Player {
    pub id: u32,
    pub token: String,
    pub session_id: u32,
    pub dog_id: u32,
}

/// Process-wide player list. Cardinality is small, linear lookups are fine.
#[derive(Debug, Default)]
pub struct Players {
    list: Vec<Player>,
    minter: TokenMinter,
}

impl Players {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly joined player and returns its minted token.
    pub fn add(&mut self, id: u32, session_id: u32, dog_id: u32) -> String {
        let token = self.minter.mint();
        self.list.push(Player {
            id,
            token: token.clone(),
            session_id,
            dog_id,
        });
        token
    }

    /// Re-attaches a player restored from a checkpoint, keeping its token.
    pub fn insert_restored(&mut self, player: Player) {
        self.list.push(player);
    }

    pub fn find_by_token(&self, token: &str) -> Option<&Player> {
        self.list.iter().find(|player| player.token == token)
    }

    pub fn in_session_of(&self, token: &str) -> Vec<&Player> {
        let Some(session_id) = self.find_by_token(token).map(|p| p.session_id) else {
            return Vec::new();
        };
        self.list
            .iter()
            .filter(|player| player.session_id == session_id)
            .collect()
    }

    pub fn remove_by_dog_id(&mut self, dog_id: u32) -> Option<Player> {
        let index = self.list.iter().position(|player| player.dog_id == dog_id)?;
        Some(self.list.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn clear(&mut self) {
        self.list.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn minted_tokens_are_32_lowercase_hex() {
        let mut minter = TokenMinter::new();
        for _ in 0..100 {
            let token = minter.mint();
            assert_eq!(token.len(), 32);
            assert!(token
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
            assert!(is_valid_token(&token));
        }
    }

    #[test]
    fn ten_thousand_mints_do_not_collide() {
        let mut minter = TokenMinter::new();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(minter.mint()));
        }
    }

    #[test]
    fn token_validation_checks_length_and_alphabet() {
        assert!(is_valid_token("0123456789abcdef0123456789abcdef"));
        assert!(is_valid_token("0123456789ABCDEF0123456789ABCDEF"));
        assert!(!is_valid_token("0123456789abcdef0123456789abcde"));
        assert!(!is_valid_token("0123456789abcdef0123456789abcdef0"));
        assert!(!is_valid_token("0123456789abcdef0123456789abcdeg"));
        assert!(!is_valid_token(""));
    }

    #[test]
    fn players_are_found_by_token_and_grouped_by_session() {
        let mut players = Players::new();
        let token_a = players.add(0, 7, 100);
        let token_b = players.add(1, 7, 101);
        let _token_c = players.add(2, 8, 102);

        let found = players.find_by_token(&token_a).expect("player exists");
        assert_eq!(found.id, 0);
        assert_eq!(found.dog_id, 100);

        let roster: Vec<u32> = players
            .in_session_of(&token_b)
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(roster, vec![0, 1]);

        assert!(players.find_by_token("ffffffffffffffffffffffffffffffff").is_none());
        assert!(players.in_session_of("not-a-token").is_empty());
    }

    #[test]
    fn remove_by_dog_id_detaches_exactly_one_player() {
        let mut players = Players::new();
        players.add(0, 1, 10);
        players.add(1, 1, 11);

        let removed = players.remove_by_dog_id(10).expect("player removed");
        assert_eq!(removed.id, 0);
        assert_eq!(players.len(), 1);
        assert!(players.remove_by_dog_id(10).is_none());
    }
}
