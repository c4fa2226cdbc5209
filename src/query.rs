//! Local criteria run as one SQL query. Filmmaker and actor criteria are
//! answered by the person service and intersected in memory; a failed lookup
//! narrows its filter to nothing rather than failing the whole query.

use std::{collections::HashSet, sync::Arc};

use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    sea_query::{Query, SelectStatement},
};
use tracing::{debug, warn};

use crate::{
    entities::{country, film, film_country, film_genre, genre},
    error::{CatalogError, CatalogResult},
    lookup::PersonLookup,
    models::{FilmFilter, FilmView, NamePair, Tokens},
    reader::FilmReader,
};

/// Role tokens sent to the person service.
#[derive(Clone, Debug)]
pub struct RoleTokens {
    pub director: String,
    pub actor: String,
}

impl Default for RoleTokens {
    fn default() -> Self {
        Self { director: "director".to_string(), actor: "actor".to_string() }
    }
}

#[derive(Clone)]
pub struct CatalogQuery {
    db: DatabaseConnection,
    reader: FilmReader,
    lookup: Arc<dyn PersonLookup>,
    roles: RoleTokens,
    default_limit: u64,
}

impl CatalogQuery {
    pub fn new(
        db: DatabaseConnection,
        lookup: Arc<dyn PersonLookup>,
        roles: RoleTokens,
        default_limit: u64,
    ) -> Self {
        Self { reader: FilmReader::new(db.clone()), db, lookup, roles, default_limit }
    }

    pub async fn filtered_films(&self, filter: &FilmFilter) -> CatalogResult<Vec<FilmView>> {
        let limit = match filter.limit {
            Some(0) => return Err(CatalogError::validation("limit must be at least 1")),
            Some(limit) => limit,
            None => self.default_limit,
        };

        let Some(condition) = self.local_condition(filter).await? else {
            debug!("no country matches the filter");
            return Ok(Vec::new());
        };

        let remote = filter.filmmaker.is_some() || filter.actor.is_some();
        let mut select = film::Entity::find()
            .filter(condition)
            .order_by_asc(film::Column::CreatedAt)
            .order_by_asc(film::Column::Id);
        if !remote {
            select = select.limit(limit);
        }
        let mut films = select.all(&self.db).await?;
        debug!(matched = films.len(), remote, "local filter applied");

        if remote {
            let (directed, acted) = futures::join!(
                self.allowed_films(filter.filmmaker.as_ref(), &self.roles.director),
                self.allowed_films(filter.actor.as_ref(), &self.roles.actor),
            );
            for allowed in [directed, acted].into_iter().flatten() {
                films.retain(|f| allowed.contains(&f.id));
            }
            films.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        self.reader.hydrate(films).await
    }

    /// `None` when there is no filter to apply. A failed lookup yields an
    /// empty set.
    async fn allowed_films(&self, name: Option<&NamePair>, role: &str) -> Option<HashSet<String>> {
        let name = name?;
        match self.lookup.films_by_person(name, role).await {
            Ok(ids) => Some(ids.into_iter().collect()),
            Err(err) => {
                warn!(role = %role, error = %err, "person lookup failed, filter matches nothing");
                Some(HashSet::new())
            },
        }
    }

    /// The SQL side of the filter, or `None` when the country tokens match no
    /// stored country.
    async fn local_condition(&self, filter: &FilmFilter) -> CatalogResult<Option<Condition>> {
        let mut condition = Condition::all()
            .add(film::Column::Rating.gte(filter.rating.unwrap_or(0.0)))
            .add(film::Column::Assessments.gte(filter.assessments.unwrap_or(0)));

        if let Some(year) = filter.year {
            condition = condition.add(film::Column::Year.eq(year));
        }
        if let Some(min) = filter.year_min {
            condition = condition.add(film::Column::Year.gte(min));
        }
        if let Some(max) = filter.year_max {
            condition = condition.add(film::Column::Year.lte(max));
        }

        let genres = filter.genres.as_ref().map(Tokens::to_vec).unwrap_or_default();
        if !genres.is_empty() {
            condition = condition.add(film::Column::Id.in_subquery(films_with_genre(&genres)));
        }

        let countries = filter.countries.as_ref().map(Tokens::to_vec).unwrap_or_default();
        if !countries.is_empty() {
            let ids = self.matching_countries(&countries).await?;
            if ids.is_empty() {
                return Ok(None);
            }
            let films = Query::select()
                .column(film_country::Column::FilmId)
                .from(film_country::Entity)
                .and_where(film_country::Column::CountryId.is_in(ids))
                .to_owned();
            condition = condition.add(film::Column::Id.in_subquery(films));
        }

        Ok(Some(condition))
    }

    /// Ids of countries whose name or slug equals a token, ignoring case.
    async fn matching_countries(&self, tokens: &[String]) -> CatalogResult<Vec<String>> {
        let tokens: HashSet<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        Ok(country::Entity::find()
            .all(&self.db)
            .await?
            .into_iter()
            .filter(|c| tokens.contains(&c.name.to_lowercase()) || tokens.contains(&c.slug.to_lowercase()))
            .map(|c| c.id)
            .collect())
    }
}

/// Film ids linked to a genre whose primary name, secondary name or slug is
/// exactly one of `tokens`.
fn films_with_genre(tokens: &[String]) -> SelectStatement {
    let mut matches = Condition::any();
    for token in tokens {
        matches = matches
            .add(genre::Column::NamePrimary.eq(token.as_str()))
            .add(genre::Column::NameSecondary.eq(token.as_str()))
            .add(genre::Column::Slug.eq(token.as_str()));
    }

    let genre_ids =
        Query::select().column(genre::Column::Id).from(genre::Entity).cond_where(matches).to_owned();

    Query::select()
        .column(film_genre::Column::FilmId)
        .from(film_genre::Entity)
        .and_where(film_genre::Column::GenreId.in_subquery(genre_ids))
        .to_owned()
}
