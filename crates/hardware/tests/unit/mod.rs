mod cache_policies;
mod retire_modes;
mod scenarios;
mod word_laws;
