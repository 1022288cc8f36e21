//! Writes `sample_participants.csv`, a semicolon-delimited participant list
//! for trying the filters by hand.

use anyhow::{Context, Result};

/// Minimal deterministic PRNG (splitmix64)
struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        SimpleRng { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[(self.next_u64() % items.len() as u64) as usize]
    }
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);

    let countries = ["Allemagne", "Espagne", "Irlande", "Italie", "Pologne", "Suède"];
    let statuses = ["Apprenti", "Elève", "Etudiant", "Personnel"];
    let establishments = [
        "EPLEFPA de Bordeaux",
        "EPLEFPA de Dijon",
        "EPLEFPA de Rennes",
        "EPLEFPA de Toulouse",
    ];
    let durations = ["14", "21", "28", "90"];

    let output_path = "sample_participants.csv";
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(output_path)
        .with_context(|| format!("creating {output_path}"))?;

    writer.write_record([
        "participant_id",
        "pays_accueil",
        "statut_participant",
        "EPLEFPA",
        "demandeur_siret",
        "duree_jours",
    ])?;

    let n_rows = 120;
    for id in 1..=n_rows {
        let establishment_idx = (rng.next_u64() % establishments.len() as u64) as usize;
        // One SIRET per establishment, like a real applicant register.
        let siret = 19_330_000_000_000u64 + establishment_idx as u64 * 1_111;
        let country = rng.pick(&countries);
        let status = rng.pick(&statuses);
        let duration = rng.pick(&durations);
        writer.write_record([
            format!("P{id:04}"),
            country.to_string(),
            status.to_string(),
            establishments[establishment_idx].to_string(),
            siret.to_string(),
            duration.to_string(),
        ])?;
    }
    writer.flush()?;

    println!("Wrote {n_rows} participants to {output_path}");
    Ok(())
}
