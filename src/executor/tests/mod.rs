mod helpers;

mod retry_tests;
