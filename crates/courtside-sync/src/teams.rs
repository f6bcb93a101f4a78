use std::collections::HashMap;

use strsim::jaro_winkler;

/// Code, city, nickname.
const NBA_TEAMS: [(&str, &str, &str); 30] = [
    ("ATL", "Atlanta", "Hawks"),
    ("BOS", "Boston", "Celtics"),
    ("BKN", "Brooklyn", "Nets"),
    ("CHA", "Charlotte", "Hornets"),
    ("CHI", "Chicago", "Bulls"),
    ("CLE", "Cleveland", "Cavaliers"),
    ("DAL", "Dallas", "Mavericks"),
    ("DEN", "Denver", "Nuggets"),
    ("DET", "Detroit", "Pistons"),
    ("GSW", "Golden State", "Warriors"),
    ("HOU", "Houston", "Rockets"),
    ("IND", "Indiana", "Pacers"),
    ("LAC", "LA", "Clippers"),
    ("LAL", "Los Angeles", "Lakers"),
    ("MEM", "Memphis", "Grizzlies"),
    ("MIA", "Miami", "Heat"),
    ("MIL", "Milwaukee", "Bucks"),
    ("MIN", "Minnesota", "Timberwolves"),
    ("NOP", "New Orleans", "Pelicans"),
    ("NYK", "New York", "Knicks"),
    ("OKC", "Oklahoma City", "Thunder"),
    ("ORL", "Orlando", "Magic"),
    ("PHI", "Philadelphia", "76ers"),
    ("PHX", "Phoenix", "Suns"),
    ("POR", "Portland", "Trail Blazers"),
    ("SAC", "Sacramento", "Kings"),
    ("SAS", "San Antonio", "Spurs"),
    ("TOR", "Toronto", "Raptors"),
    ("UTA", "Utah", "Jazz"),
    ("WAS", "Washington", "Wizards"),
];

/// Short forms and colloquial names seen upstream.
const NBA_EXTRA_ALIASES: [(&str, &str); 17] = [
    ("GS", "GSW"),
    ("SA", "SAS"),
    ("NO", "NOP"),
    ("NY", "NYK"),
    ("UTAH", "UTA"),
    ("WSH", "WAS"),
    ("BRK", "BKN"),
    ("PHO", "PHX"),
    ("Los Angeles Clippers", "LAC"),
    ("Sixers", "PHI"),
    ("Blazers", "POR"),
    ("Cavs", "CLE"),
    ("Mavs", "DAL"),
    ("Wolves", "MIN"),
    ("Pels", "NOP"),
    ("Nugs", "DEN"),
    ("Dubs", "GSW"),
];

/// Cities shared by more than one team never resolve on their own.
const SHARED_CITIES: [&str; 2] = ["LA", "Los Angeles"];

const MIN_FUZZY_ALIAS_LEN: usize = 4;
const MIN_SUBSTRING_NICKNAME_LEN: usize = 4;

/// Resolves free-form team identifiers ("Celtics", "BOS", "Boston Celtics") to one code.
#[derive(Debug, Clone)]
pub struct TeamDirectory {
    aliases: HashMap<String, String>,
    /// Folded nickname and code, longest nickname first.
    nicknames: Vec<(String, String)>,
    threshold: f64,
}

impl Default for TeamDirectory {
    fn default() -> Self {
        Self::nba(0.93)
    }
}

impl TeamDirectory {
    pub fn empty(threshold: f64) -> Self {
        Self {
            aliases: HashMap::new(),
            nicknames: Vec::new(),
            threshold,
        }
    }

    pub fn nba(threshold: f64) -> Self {
        let mut dir = Self::empty(threshold);
        for (code, city, nickname) in NBA_TEAMS {
            dir = dir.with_team(code, nickname);
            dir = dir.with_alias(&format!("{city} {nickname}"), code);
            if !SHARED_CITIES.contains(&city) {
                dir = dir.with_alias(city, code);
            }
        }
        for (alias, code) in NBA_EXTRA_ALIASES {
            dir = dir.with_alias(alias, code);
        }
        dir
    }

    /// Registers a team code together with its nickname.
    pub fn with_team(mut self, code: &str, nickname: &str) -> Self {
        let code = code.trim().to_ascii_uppercase();
        self.aliases.insert(fold(&code), code.clone());
        let folded = fold(nickname);
        if !folded.is_empty() {
            self.aliases.insert(folded.clone(), code.clone());
            self.nicknames.push((folded, code));
            self.nicknames
                .sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.cmp(b)));
        }
        self
    }

    pub fn with_alias(mut self, alias: &str, code: &str) -> Self {
        let folded = fold(alias);
        if !folded.is_empty() {
            self.aliases.insert(folded, code.trim().to_ascii_uppercase());
        }
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Canonical code for `raw`, or its folded form when nothing in the directory is close.
    pub fn canonical(&self, raw: &str) -> String {
        let folded = fold(raw);
        if folded.is_empty() {
            return folded;
        }
        if let Some(code) = self.aliases.get(&folded) {
            return code.clone();
        }
        if let Some((_, code)) = self
            .nicknames
            .iter()
            .find(|(nick, _)| nick.len() >= MIN_SUBSTRING_NICKNAME_LEN && folded.contains(nick.as_str()))
        {
            return code.clone();
        }
        self.fuzzy(&folded).unwrap_or(folded)
    }

    /// Whether two identifiers resolve to the same team.
    pub fn same_team(&self, a: &str, b: &str) -> bool {
        self.canonical(a) == self.canonical(b)
    }

    fn fuzzy(&self, folded: &str) -> Option<String> {
        let mut best: Option<(f64, &str)> = None;
        for (alias, code) in &self.aliases {
            if alias.len() < MIN_FUZZY_ALIAS_LEN {
                continue;
            }
            let score = jaro_winkler(folded, alias);
            if score < self.threshold {
                continue;
            }
            best = match best {
                Some((best_score, best_code))
                    if best_score > score || (best_score == score && best_code <= code.as_str()) =>
                {
                    Some((best_score, best_code))
                }
                _ => Some((score, code.as_str())),
            };
        }
        best.map(|(_, code)| code.to_string())
    }
}

/// Lowercases, folds Latin diacritics to ASCII and drops everything that is not alphanumeric.
pub fn fold(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars().flat_map(char::to_lowercase) {
        match ch {
            'a'..='z' | '0'..='9' => out.push(ch),
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' => out.push('a'),
            'æ' => out.push_str("ae"),
            'ç' | 'ć' | 'č' => out.push('c'),
            'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' => out.push('e'),
            'ì' | 'í' | 'î' | 'ï' | 'ī' => out.push('i'),
            'ł' => out.push('l'),
            'ñ' | 'ń' => out.push('n'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' => out.push('o'),
            'œ' => out.push_str("oe"),
            'ś' | 'š' => out.push('s'),
            'ß' => out.push_str("ss"),
            'ù' | 'ú' | 'û' | 'ü' | 'ū' => out.push('u'),
            'ý' | 'ÿ' => out.push('y'),
            'ź' | 'ż' | 'ž' => out.push('z'),
            _ => {}
        }
    }
    out
}
