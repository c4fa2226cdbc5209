use serde::{Deserialize, Serialize};

use crate::entities::{country, film, film_role, genre, language, person, quality, trailer};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct NewTrailer {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewGenre {
    pub name_primary: String,
    #[serde(default)]
    pub name_secondary: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewFilm {
    pub name_primary: String,
    #[serde(default)]
    pub name_secondary: Option<String>,
    #[serde(default)]
    pub description: String,
    pub year: i32,
    pub country: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub assessments: i32,
    #[serde(default)]
    pub reviews: i32,
    #[serde(default)]
    pub age_limit: i32,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub qualities: Vec<String>,
    #[serde(default)]
    pub trailers: Vec<NewTrailer>,
    #[serde(default)]
    pub languages_audio: Vec<String>,
    #[serde(default)]
    pub languages_subtitle: Vec<String>,
    #[serde(default)]
    pub genres: Vec<NewGenre>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewPerson {
    pub film_role: String,
    #[serde(default)]
    pub film_role_slug: Option<String>,
    pub first_name_primary: String,
    pub last_name_primary: String,
    #[serde(default)]
    pub first_name_secondary: Option<String>,
    #[serde(default)]
    pub last_name_secondary: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// A film with every related collection loaded.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct FilmView {
    #[serde(flatten)]
    pub film: film::Model,
    pub trailers: Vec<trailer::Model>,
    pub genres: Vec<genre::Model>,
    pub qualities: Vec<quality::Model>,
    pub languages_audio: Vec<language::Model>,
    pub languages_subtitle: Vec<language::Model>,
    pub countries: Vec<country::Model>,
}

impl FilmView {
    pub fn id(&self) -> &str {
        &self.film.id
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct FilmRef {
    pub film_id: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PersonView {
    #[serde(flatten)]
    pub person: person::Model,
    pub roles: Vec<film_role::Model>,
    pub films: Vec<FilmRef>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct FilmSummary {
    pub id: String,
    pub name_primary: String,
    pub name_secondary: Option<String>,
    pub year: i32,
}

impl From<film::Model> for FilmSummary {
    fn from(film: film::Model) -> Self {
        Self {
            id: film.id,
            name_primary: film.name_primary,
            name_secondary: film.name_secondary,
            year: film.year,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GenreDetails {
    #[serde(flatten)]
    pub genre: genre::Model,
    pub films: Vec<FilmSummary>,
}

/// First and last name, sent as a two-element array.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct NamePair(pub String, pub String);

impl NamePair {
    pub fn new(first: impl Into<String>, last: impl Into<String>) -> Self {
        Self(first.into(), last.into())
    }

    pub fn first(&self) -> &str {
        &self.0
    }

    pub fn last(&self) -> &str {
        &self.1
    }
}

/// A single token or a list of them.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Tokens {
    One(String),
    Many(Vec<String>),
}

impl Tokens {
    /// Non-blank tokens; empty means "no filter".
    pub fn to_vec(&self) -> Vec<String> {
        let all = match self {
            Tokens::One(token) => std::slice::from_ref(token),
            Tokens::Many(tokens) => tokens.as_slice(),
        };
        all.iter().map(|t| t.trim()).filter(|t| !t.is_empty()).map(str::to_string).collect()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct FilmFilter {
    #[serde(default)]
    pub genres: Option<Tokens>,
    #[serde(default)]
    pub countries: Option<Tokens>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub year_min: Option<i32>,
    #[serde(default)]
    pub year_max: Option<i32>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub assessments: Option<i32>,
    #[serde(default)]
    pub filmmaker: Option<NamePair>,
    #[serde(default)]
    pub actor: Option<NamePair>,
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PersonQuery {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub film_role: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FilmsByPerson {
    pub films: Vec<FilmRef>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FilmIds {
    pub films: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NameQuery {
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UpdateFilmName {
    pub film_id: String,
    pub name_primary: String,
    #[serde(default)]
    pub name_secondary: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UpdateGenreName {
    pub genre_id: String,
    pub name_primary: String,
    #[serde(default)]
    pub name_secondary: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AddPersons {
    pub persons: Vec<NewPerson>,
    pub film_id: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn countries_accept_one_or_many() {
        let one: FilmFilter = serde_json::from_value(json!({"countries": "France"})).unwrap();
        assert_eq!(one.countries.unwrap().to_vec(), vec!["France"]);

        let many: FilmFilter =
            serde_json::from_value(json!({"countries": ["France", " ", "Italy"]})).unwrap();
        assert_eq!(many.countries.unwrap().to_vec(), vec!["France", "Italy"]);
    }

    #[test]
    fn name_pair_is_an_array() {
        let filter: FilmFilter =
            serde_json::from_value(json!({"filmmaker": ["Alex", "Smith"]})).unwrap();
        let pair = filter.filmmaker.unwrap();
        assert_eq!((pair.first(), pair.last()), ("Alex", "Smith"));
    }

    #[test]
    fn trailer_fields_are_optional() {
        let film: NewFilm = serde_json::from_value(json!({
            "name_primary": "Heat",
            "year": 1995,
            "country": "USA",
            "trailers": [{"url": "https://example.test/t.mp4"}]
        }))
        .unwrap();
        assert_eq!(film.trailers[0].image, None);
        assert!(film.genres.is_empty());
    }
}
