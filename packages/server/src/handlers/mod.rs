pub mod avatar;
