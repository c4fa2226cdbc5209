use futures::FutureExt;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set,
    sea_query::{OnConflict, Query},
};
use tracing::{debug, info};

use crate::{
    entities::{film_person, film_role, person, person_film_role},
    error::{CatalogError, CatalogResult},
    models::{FilmsByPerson, NewPerson, PersonQuery, PersonView},
    reader::{PersonReader, contains_folded, dedup_film_refs},
    reference::{Join, Reference, ReferenceStore, insert_or_fetch, new_id},
    writer::{Step, run_steps},
};

#[derive(Clone, Debug)]
pub struct PersonWriter {
    store: ReferenceStore,
    reader: PersonReader,
    fanout: usize,
}

impl PersonWriter {
    pub fn new(db: DatabaseConnection, fanout: usize) -> Self {
        Self {
            store: ReferenceStore::new(db.clone()),
            reader: PersonReader::new(db),
            fanout: fanout.max(1),
        }
    }

    /// Attaches every person to `film_id` in their role, creating persons and
    /// roles on first sight. Each person is handled independently; the result
    /// is the film's full roster afterwards.
    pub async fn add_persons(
        &self,
        persons: &[NewPerson],
        film_id: &str,
    ) -> CatalogResult<Vec<PersonView>> {
        if film_id.trim().is_empty() {
            return Err(CatalogError::validation("film id is empty"));
        }
        for new in persons {
            validate_person(new)?;
        }

        let steps: Vec<Step<'_>> = persons.iter().map(|new| self.person_step(film_id, new)).collect();
        let failures = run_steps(steps, self.fanout).await;
        if !failures.is_empty() {
            return Err(CatalogError::PartialWrite {
                entity: "film roster",
                id: film_id.to_string(),
                failures,
            });
        }

        info!(film_id = %film_id, persons = persons.len(), "persons attached");
        self.reader.persons_from_film(film_id).await
    }

    fn person_step<'a>(&'a self, film_id: &'a str, new: &'a NewPerson) -> Step<'a> {
        async move {
            let label = format!(
                "{} {} {}",
                new.film_role, new.first_name_primary, new.last_name_primary
            );
            let result: CatalogResult<()> = async {
                let person_id = self.resolve_person(new).await?;
                let role_id = self
                    .store
                    .resolve(Reference::FilmRole {
                        name: &new.film_role,
                        slug: new.film_role_slug.as_deref(),
                    })
                    .await?;
                self.store.link(Join::PersonRole, &person_id, &role_id).await?;
                self.store.link(Join::FilmPerson, film_id, &person_id).await?;
                Ok(())
            }
            .await;
            (label, result)
        }
        .boxed()
    }

    /// Finds the person by primary first and last name, creating them with
    /// the supplied secondary names and image if absent.
    async fn resolve_person(&self, new: &NewPerson) -> CatalogResult<String> {
        let model = person::ActiveModel {
            id: Set(new_id()),
            first_name_primary: Set(new.first_name_primary.clone()),
            last_name_primary: Set(new.last_name_primary.clone()),
            first_name_secondary: Set(new.first_name_secondary.clone()),
            last_name_secondary: Set(new.last_name_secondary.clone()),
            image: Set(new.image.clone()),
        };

        let row = insert_or_fetch(
            self.store.db(),
            model,
            OnConflict::columns([
                person::Column::FirstNamePrimary,
                person::Column::LastNamePrimary,
            ])
            .do_nothing()
            .to_owned(),
            Condition::all()
                .add(person::Column::FirstNamePrimary.eq(new.first_name_primary.as_str()))
                .add(person::Column::LastNamePrimary.eq(new.last_name_primary.as_str())),
        )
        .await?;

        debug!(person_id = %row.id, "resolved person");
        Ok(row.id)
    }
}

fn validate_person(new: &NewPerson) -> CatalogResult<()> {
    if new.first_name_primary.trim().is_empty() || new.last_name_primary.trim().is_empty() {
        return Err(CatalogError::validation("person name is empty"));
    }
    if new.film_role.trim().is_empty() {
        return Err(CatalogError::validation("film role is empty"));
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct PersonDirectory {
    db: DatabaseConnection,
    reader: PersonReader,
}

impl PersonDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { reader: PersonReader::new(db.clone()), db }
    }

    pub fn reader(&self) -> &PersonReader {
        &self.reader
    }

    pub async fn persons_by_name(&self, query: &PersonQuery) -> CatalogResult<Vec<PersonView>> {
        let persons = self.matching(query).await?;
        self.reader.hydrate(persons).await
    }

    /// Union of the films of everyone matching, first-seen order.
    pub async fn films_by_person(&self, query: &PersonQuery) -> CatalogResult<FilmsByPerson> {
        let persons = self.matching(query).await?;
        if persons.is_empty() {
            return Ok(FilmsByPerson::default());
        }

        let film_ids: Vec<String> = film_person::Entity::find()
            .select_only()
            .column(film_person::Column::FilmId)
            .filter(film_person::Column::PersonId.is_in(persons.into_iter().map(|p| p.id)))
            .order_by_asc(film_person::Column::Id)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(FilmsByPerson { films: dedup_film_refs(film_ids) })
    }

    /// Persons holding the role whose names match the query tokens.
    async fn matching(&self, query: &PersonQuery) -> CatalogResult<Vec<person::Model>> {
        let role = query.film_role.trim().to_lowercase();
        if role.is_empty() {
            return Err(CatalogError::validation("film role is empty"));
        }

        let role_ids = Query::select()
            .column(film_role::Column::Id)
            .from(film_role::Entity)
            .cond_where(
                Condition::any()
                    .add(film_role::Column::Name.eq(role.as_str()))
                    .add(film_role::Column::Slug.eq(role.as_str())),
            )
            .to_owned();
        let holders = Query::select()
            .column(person_film_role::Column::PersonId)
            .from(person_film_role::Entity)
            .and_where(person_film_role::Column::FilmRoleId.in_subquery(role_ids))
            .to_owned();

        let first = folded_token(query.first_name.as_deref());
        let last = folded_token(query.last_name.as_deref());

        let persons: Vec<person::Model> = person::Entity::find()
            .filter(person::Column::Id.in_subquery(holders))
            .order_by_asc(person::Column::LastNamePrimary)
            .order_by_asc(person::Column::FirstNamePrimary)
            .all(&self.db)
            .await?
            .into_iter()
            .filter(|p| name_matches(p, first.as_deref(), last.as_deref()))
            .collect();

        debug!(role = %role, matched = persons.len(), "person name lookup");
        Ok(persons)
    }
}

fn folded_token(token: Option<&str>) -> Option<String> {
    token.map(str::trim).filter(|t| !t.is_empty()).map(str::to_lowercase)
}

/// Each given token must be a substring of that name in either language.
/// The tokens combine with AND: a first-name hit with a last-name miss is not
/// a match, even though one of the four name columns agrees.
fn name_matches(person: &person::Model, first: Option<&str>, last: Option<&str>) -> bool {
    let either = |primary: &str, secondary: Option<&str>, token: &str| {
        contains_folded(primary, token) || secondary.is_some_and(|s| contains_folded(s, token))
    };

    first.is_none_or(|t| {
        either(&person.first_name_primary, person.first_name_secondary.as_deref(), t)
    }) && last.is_none_or(|t| {
        either(&person.last_name_primary, person.last_name_secondary.as_deref(), t)
    })
}

#[cfg(test)]
mod tests {
    use sea_orm::PaginatorTrait;

    use super::*;
    use crate::db;

    fn new_person(role: &str, first: &str, last: &str) -> NewPerson {
        NewPerson {
            film_role: role.to_string(),
            film_role_slug: None,
            first_name_primary: first.to_string(),
            last_name_primary: last.to_string(),
            first_name_secondary: None,
            last_name_secondary: None,
            image: None,
        }
    }

    fn query(first: &str, last: &str, role: &str) -> PersonQuery {
        PersonQuery {
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            film_role: role.to_string(),
        }
    }

    #[tokio::test]
    async fn adding_same_person_twice_links_once() {
        let db = db::memory().await;
        let writer = PersonWriter::new(db.clone(), 4);
        let crew = [new_person("Director", "Michael", "Mann")];

        writer.add_persons(&crew, "film-1").await.unwrap();
        let roster = writer.add_persons(&crew, "film-1").await.unwrap();

        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].roles[0].name, "director");
        assert_eq!(roster[0].films.len(), 1);
        assert_eq!(person::Entity::find().count(&db).await.unwrap(), 1);
        assert_eq!(film_person::Entity::find().count(&db).await.unwrap(), 1);
        assert_eq!(person_film_role::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn one_person_can_hold_several_roles() {
        let db = db::memory().await;
        let writer = PersonWriter::new(db.clone(), 4);

        let roster = writer
            .add_persons(
                &[new_person("director", "Clint", "Eastwood"), new_person("actor", "Clint", "Eastwood")],
                "film-1",
            )
            .await
            .unwrap();

        assert_eq!(roster.len(), 1);
        let roles: Vec<_> = roster[0].roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(roles, ["actor", "director"]);
    }

    #[tokio::test]
    async fn blank_name_rejects_whole_batch() {
        let db = db::memory().await;
        let writer = PersonWriter::new(db.clone(), 4);

        let err = writer
            .add_persons(&[new_person("actor", "Al", "Pacino"), new_person("actor", "", "X")], "film-1")
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Validation(_)));
        assert_eq!(person::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn name_tokens_match_either_language() {
        let db = db::memory().await;
        let writer = PersonWriter::new(db.clone(), 4);
        let mut tarkovsky = new_person("режиссер", "Андрей", "Тарковский");
        tarkovsky.film_role_slug = Some("director".to_string());
        tarkovsky.first_name_secondary = Some("Andrei".to_string());
        tarkovsky.last_name_secondary = Some("Tarkovsky".to_string());
        writer.add_persons(&[tarkovsky], "solaris").await.unwrap();

        let directory = PersonDirectory::new(db);

        let by_latin = directory.persons_by_name(&query("andr", "TARKOV", "director")).await.unwrap();
        assert_eq!(by_latin.len(), 1);

        let by_cyrillic =
            directory.persons_by_name(&query("АНДРЕЙ", "тарковский", "режиссер")).await.unwrap();
        assert_eq!(by_cyrillic.len(), 1);

        // First name matches, last name does not.
        let mismatch = directory.persons_by_name(&query("Andrei", "Rublev", "director")).await.unwrap();
        assert!(mismatch.is_empty());

        let wrong_role = directory.persons_by_name(&query("Andrei", "", "actor")).await.unwrap();
        assert!(wrong_role.is_empty());
    }

    #[tokio::test]
    async fn films_by_person_is_a_deduplicated_union() {
        let db = db::memory().await;
        let writer = PersonWriter::new(db.clone(), 4);
        writer.add_persons(&[new_person("actor", "Tom", "Hardy")], "f1").await.unwrap();
        writer.add_persons(&[new_person("actor", "Tom", "Hanks")], "f2").await.unwrap();
        writer.add_persons(&[new_person("actor", "Tom", "Hanks")], "f1").await.unwrap();
        writer.add_persons(&[new_person("director", "Tom", "Tykwer")], "f3").await.unwrap();

        let directory = PersonDirectory::new(db);
        let found = directory
            .films_by_person(&PersonQuery {
                first_name: Some("tom".to_string()),
                last_name: None,
                film_role: "actor".to_string(),
            })
            .await
            .unwrap();

        let ids: Vec<_> = found.films.iter().map(|f| f.film_id.as_str()).collect();
        assert_eq!(ids, ["f1", "f2"]);

        let nobody = directory.films_by_person(&query("Nobody", "Here", "actor")).await.unwrap();
        assert!(nobody.films.is_empty());
    }
}
