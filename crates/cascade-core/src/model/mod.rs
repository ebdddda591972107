pub mod action;
pub mod agent;
pub mod card;
pub mod deck;
pub mod moves;
pub mod rank;
