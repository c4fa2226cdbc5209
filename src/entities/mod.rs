pub mod country;
pub mod film;
pub mod film_country;
pub mod film_genre;
pub mod film_language_audio;
pub mod film_language_subtitle;
pub mod film_person;
pub mod film_quality;
pub mod film_role;
pub mod genre;
pub mod language;
pub mod person;
pub mod person_film_role;
pub mod quality;
pub mod trailer;
