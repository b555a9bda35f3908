mod res;
