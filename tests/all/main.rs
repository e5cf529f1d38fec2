mod connection;
mod helpers;
mod topics;
