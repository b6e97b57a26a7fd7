mod helpers;
mod host;
mod session;
