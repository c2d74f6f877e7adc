pub mod vote_ingest;
