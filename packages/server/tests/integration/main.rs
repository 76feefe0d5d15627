mod avatar;
mod common;
