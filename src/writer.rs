//! The film row goes in first, then every related collection is linked as its
//! own step. Committed steps are not rolled back when a sibling fails.

use std::sync::atomic::{AtomicI64, Ordering};

use futures::{FutureExt, StreamExt, future::BoxFuture, stream};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    sea_query::{Expr, OnConflict},
};
use tracing::{debug, error, info};

use crate::{
    entities::{film, genre, trailer},
    error::{CatalogError, CatalogResult, StepFailure, is_unique_violation},
    models::{FilmView, GenreDetails, NewFilm, NewTrailer},
    reader::FilmReader,
    reference::{Join, Reference, ReferenceStore, insert_ignore, new_id},
};

/// One fan-out step: its label and outcome.
pub(crate) type Step<'a> = BoxFuture<'a, (String, CatalogResult<()>)>;

/// Awaits every step, at most `concurrency` at a time, and returns the ones
/// that failed.
pub(crate) async fn run_steps(steps: Vec<Step<'_>>, concurrency: usize) -> Vec<StepFailure> {
    stream::iter(steps)
        .buffer_unordered(concurrency.max(1))
        .filter_map(|(step, result)| async move {
            match result {
                Ok(()) => None,
                Err(err) => {
                    error!(step = %step, error = %err, "write step failed");
                    Some(StepFailure { step, error: err.to_string() })
                },
            }
        })
        .collect()
        .await
}

static LAST_CREATED_AT: AtomicI64 = AtomicI64::new(0);

/// Millisecond timestamp, strictly increasing within the process so listing
/// order follows insertion order.
fn next_created_at() -> i64 {
    let now = jiff::Timestamp::now().as_millisecond();
    let mut last = LAST_CREATED_AT.load(Ordering::SeqCst);
    loop {
        let next = now.max(last + 1);
        match LAST_CREATED_AT.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FilmWriter {
    store: ReferenceStore,
    reader: FilmReader,
    fanout: usize,
}

impl FilmWriter {
    pub fn new(db: DatabaseConnection, fanout: usize) -> Self {
        Self {
            store: ReferenceStore::new(db.clone()),
            reader: FilmReader::new(db),
            fanout: fanout.max(1),
        }
    }

    fn db(&self) -> &DatabaseConnection {
        self.store.db()
    }

    /// Creates the film and links everything it references. A film with the
    /// same primary name and year is a [`CatalogError::Conflict`].
    pub async fn add_film(&self, new: &NewFilm) -> CatalogResult<FilmView> {
        validate_film(new)?;

        let film_id = new_id();
        let root = film::ActiveModel {
            id: Set(film_id.clone()),
            name_primary: Set(new.name_primary.clone()),
            name_secondary: Set(new.name_secondary.clone()),
            description: Set(new.description.clone()),
            year: Set(new.year),
            rating: Set(new.rating),
            assessments: Set(new.assessments),
            reviews: Set(new.reviews),
            age_limit: Set(new.age_limit),
            duration: Set(new.duration.clone()),
            image: Set(new.image.clone()),
            created_at: Set(next_created_at()),
        };

        let inserted = insert_ignore(
            self.db(),
            root,
            OnConflict::columns([film::Column::NamePrimary, film::Column::Year]),
        )
        .await?;
        if !inserted {
            debug!(name = %new.name_primary, year = new.year, "film already exists");
            return Err(CatalogError::Conflict(format!(
                "film {:?} ({})",
                new.name_primary, new.year
            )));
        }

        let mut steps: Vec<Step<'_>> = Vec::new();
        steps.push(self.link_step(
            &film_id,
            format!("country {}", new.country),
            Reference::Country(&new.country),
            Join::FilmCountry,
        ));
        for name in &new.qualities {
            steps.push(self.link_step(
                &film_id,
                format!("quality {name}"),
                Reference::Quality(name),
                Join::FilmQuality,
            ));
        }
        for name in &new.languages_audio {
            steps.push(self.link_step(
                &film_id,
                format!("audio language {name}"),
                Reference::Language(name),
                Join::FilmAudio,
            ));
        }
        for name in &new.languages_subtitle {
            steps.push(self.link_step(
                &film_id,
                format!("subtitle language {name}"),
                Reference::Language(name),
                Join::FilmSubtitle,
            ));
        }
        for g in &new.genres {
            steps.push(self.link_step(
                &film_id,
                format!("genre {}", g.name_primary),
                Reference::Genre {
                    name_primary: &g.name_primary,
                    name_secondary: g.name_secondary.as_deref(),
                    slug: g.slug.as_deref(),
                },
                Join::FilmGenre,
            ));
        }
        for (index, t) in new.trailers.iter().enumerate() {
            steps.push(self.trailer_step(&film_id, index, t));
        }

        let total = steps.len();
        let failures = run_steps(steps, self.fanout).await;
        if !failures.is_empty() {
            return Err(CatalogError::PartialWrite { entity: "film", id: film_id, failures });
        }

        info!(film_id = %film_id, name = %new.name_primary, year = new.year, steps = total, "film added");

        self.reader
            .film(&film_id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("film {film_id}")))
    }

    fn link_step<'a>(
        &'a self,
        film_id: &'a str,
        label: String,
        reference: Reference<'a>,
        join: Join,
    ) -> Step<'a> {
        async move {
            let result: CatalogResult<()> = async {
                let target = self.store.resolve(reference).await?;
                self.store.link(join, film_id, &target).await?;
                Ok(())
            }
            .await;
            (label, result)
        }
        .boxed()
    }

    fn trailer_step<'a>(&'a self, film_id: &'a str, index: usize, new: &'a NewTrailer) -> Step<'a> {
        async move {
            let model = trailer::ActiveModel {
                id: Set(new_id()),
                film_id: Set(film_id.to_string()),
                url: Set(new.url.clone().unwrap_or_default()),
                image: Set(new.image.clone().unwrap_or_default()),
                date: Set(new.date.clone().unwrap_or_default()),
            };
            let result = trailer::Entity::insert(model)
                .exec_without_returning(self.db())
                .await
                .map(|_| ())
                .map_err(CatalogError::from);
            (format!("trailer #{index}"), result)
        }
        .boxed()
    }

    /// Renames a film. `None` when the id is unknown.
    pub async fn update_film(
        &self,
        id: &str,
        name_primary: &str,
        name_secondary: Option<&str>,
    ) -> CatalogResult<Option<FilmView>> {
        if name_primary.trim().is_empty() {
            return Err(CatalogError::validation("film name is empty"));
        }

        let updated = film::Entity::update_many()
            .col_expr(film::Column::NamePrimary, Expr::value(name_primary))
            .col_expr(film::Column::NameSecondary, Expr::value(name_secondary.map(str::to_string)))
            .filter(film::Column::Id.eq(id))
            .exec(self.db())
            .await;

        let rows = match updated {
            Ok(result) => result.rows_affected,
            Err(err) if is_unique_violation(&err) => {
                return Err(CatalogError::Conflict(format!("film {name_primary:?}")));
            },
            Err(err) => return Err(err.into()),
        };
        if rows == 0 {
            return Ok(None);
        }

        debug!(film_id = %id, name = %name_primary, "film renamed");
        self.reader.film(id).await
    }

    /// Hard-deletes the root row only and returns what it looked like.
    /// Join rows pointing at it are left behind.
    pub async fn delete_film(&self, id: &str) -> CatalogResult<Option<FilmView>> {
        let Some(snapshot) = self.reader.film(id).await? else {
            return Ok(None);
        };

        film::Entity::delete_by_id(id.to_string()).exec(self.db()).await?;

        info!(film_id = %id, "film deleted");
        Ok(Some(snapshot))
    }

    pub async fn update_genre(
        &self,
        id: &str,
        name_primary: &str,
        name_secondary: Option<&str>,
    ) -> CatalogResult<Option<GenreDetails>> {
        if name_primary.trim().is_empty() {
            return Err(CatalogError::validation("genre name is empty"));
        }

        let updated = genre::Entity::update_many()
            .col_expr(genre::Column::NamePrimary, Expr::value(name_primary))
            .col_expr(genre::Column::NameSecondary, Expr::value(name_secondary.map(str::to_string)))
            .filter(genre::Column::Id.eq(id))
            .exec(self.db())
            .await;

        let rows = match updated {
            Ok(result) => result.rows_affected,
            Err(err) if is_unique_violation(&err) => {
                return Err(CatalogError::Conflict(format!("genre {name_primary:?}")));
            },
            Err(err) => return Err(err.into()),
        };
        if rows == 0 {
            return Ok(None);
        }

        self.reader.genre(id).await
    }
}

fn validate_film(new: &NewFilm) -> CatalogResult<()> {
    if new.name_primary.trim().is_empty() {
        return Err(CatalogError::validation("film name is empty"));
    }
    if new.country.trim().is_empty() {
        return Err(CatalogError::validation("film country is empty"));
    }

    let blank = |s: &String| s.trim().is_empty();
    if new.qualities.iter().any(blank) {
        return Err(CatalogError::validation("quality name is empty"));
    }
    if new.languages_audio.iter().chain(&new.languages_subtitle).any(blank) {
        return Err(CatalogError::validation("language name is empty"));
    }
    if new.genres.iter().any(|g| blank(&g.name_primary)) {
        return Err(CatalogError::validation("genre name is empty"));
    }
    Ok(())
}
