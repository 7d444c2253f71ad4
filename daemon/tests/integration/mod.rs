mod correlation_store_tests;
