pub mod collecting;
